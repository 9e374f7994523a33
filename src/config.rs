// Copyright 2024 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! ## Force-field configuration
//!
//! User-facing description of the non-bonded interaction models and their
//! validation into a [`ForceField`]: derived reaction-field constants,
//! resolved per-type-pair Lennard-Jones coefficients, and interpolation
//! tables where the chosen models need them. All validation happens here,
//! once, so the force kernel runs without error paths.

use crate::switch::SwitchFunction;
use crate::table::{PairTable, TableKind, TableParams, DEFAULT_TABLE_SCALE};
use crate::{arithmetic_mean, geometric_mean, Cutoff, Info, ELECTRIC_PREFACTOR};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Errors detected while validating a [`NonbondedConfig`]
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cutoff radius must be positive and finite, got {0}")]
    InvalidCutoff(f64),
    #[error("switch radius {r1} must lie in (0, {rc}]")]
    InvalidSwitchRadius { r1: f64, rc: f64 },
    #[error("reaction-field dielectric must be non-negative, got {0}")]
    InvalidDielectric(f64),
    #[error("ewald splitting coefficient must be positive, got {0}")]
    InvalidEwaldCoefficient(f64),
    #[error("table scale must be positive, got {0}")]
    InvalidTableScale(f64),
    #[error("lennard-jones parameters define no particle types")]
    EmptyTypes,
    #[error("per-type parameter lengths differ: {epsilons} epsilons vs {sigmas} sigmas")]
    RaggedTypeParameters { epsilons: usize, sigmas: usize },
    #[error("pair matrix holds {len} entries but {ntypes} types need a square matrix")]
    NonSquareMatrix { len: usize, ntypes: usize },
}

/// Electrostatic interaction models
///
/// All models share the cutoff radius from the configuration; they differ in
/// how the potential is corrected towards and beyond it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CoulombModel {
    /// Plain 1/r, hard-truncated at the cutoff
    Cutoff,
    /// Reaction field: continuum dielectric correction beyond the cutoff.
    /// `epsilon_rf = 0` means an infinite (conducting) dielectric.
    ReactionField { epsilon_rf: f64 },
    /// Tabulated Coulomb with a polynomial force-shift correction taking the
    /// force smoothly to zero between the switch radius and the cutoff
    Shifted,
    /// Tabulated Coulomb multiplied by the smooth switching window
    Switched,
    /// Real-space part of Ewald summation, erfc(βr)/r
    Ewald { beta: f64 },
}

impl Info for CoulombModel {
    fn citation(&self) -> Option<&'static str> {
        match self {
            CoulombModel::ReactionField { .. } => Some("doi:10.1063/1.468398"),
            CoulombModel::Ewald { .. } => Some("doi:10.1002/andp.19213690304"),
            _ => None,
        }
    }
    fn short_name(&self) -> Option<&'static str> {
        Some(match self {
            CoulombModel::Cutoff => "cut",
            CoulombModel::ReactionField { .. } => "rf",
            CoulombModel::Shifted => "shift",
            CoulombModel::Switched => "switch",
            CoulombModel::Ewald { .. } => "ewald",
        })
    }
}

/// Lennard-Jones truncation models
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum VdwModel {
    /// Hard truncation at the cutoff
    Cutoff,
    /// Hard truncation with the potential shifted to zero at the cutoff
    PotentialShift,
    /// Tabulated, multiplied by the smooth switching window
    Switched,
}

impl Info for VdwModel {
    fn short_name(&self) -> Option<&'static str> {
        Some(match self {
            VdwModel::Cutoff => "lj-cut",
            VdwModel::PotentialShift => "lj-shift",
            VdwModel::Switched => "lj-switch",
        })
    }
}

/// Mixing rules producing pair coefficients from per-type (ε, σ) parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CombinationRule {
    /// Geometric mean of the per-type c6 and c12 coefficients
    Geometric,
    /// Arithmetic mean of σ, geometric mean of ε
    LorentzBerthelot,
}

/// c6 and c12 from a single type's (ε, σ)
fn lj_coefficients((epsilon, sigma): (f64, f64)) -> (f64, f64) {
    let s6 = sigma.powi(6);
    (4.0 * epsilon * s6, 4.0 * epsilon * s6 * s6)
}

impl CombinationRule {
    /// Pair (c6, c12) from two per-type (ε, σ) parameter sets
    pub fn combine(&self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match self {
            CombinationRule::Geometric => {
                let (c6a, c12a) = lj_coefficients(a);
                let (c6b, c12b) = lj_coefficients(b);
                (geometric_mean((c6a, c6b)), geometric_mean((c12a, c12b)))
            }
            CombinationRule::LorentzBerthelot => lj_coefficients((
                geometric_mean((a.0, b.0)),
                arithmetic_mean((a.1, b.1)),
            )),
        }
    }
}

/// Lennard-Jones input parameters, either explicit per-pair or mixed per-type
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum LjParameters {
    /// Explicit row-major `ntypes × ntypes` coefficient matrices
    PairMatrix {
        ntypes: usize,
        c6: Vec<f64>,
        c12: Vec<f64>,
    },
    /// Per-type well depth and size, mixed by a combination rule
    PerType {
        epsilons: Vec<f64>,
        sigmas: Vec<f64>,
        rule: CombinationRule,
    },
}

impl LjParameters {
    fn resolve(&self) -> Result<LjTable, ConfigError> {
        match self {
            LjParameters::PairMatrix { ntypes, c6, c12 } => {
                if *ntypes == 0 {
                    return Err(ConfigError::EmptyTypes);
                }
                for matrix in [c6, c12] {
                    if matrix.len() != ntypes * ntypes {
                        return Err(ConfigError::NonSquareMatrix {
                            len: matrix.len(),
                            ntypes: *ntypes,
                        });
                    }
                }
                Ok(LjTable {
                    ntypes: *ntypes,
                    c6: c6.clone(),
                    c12: c12.clone(),
                })
            }
            LjParameters::PerType {
                epsilons,
                sigmas,
                rule,
            } => {
                if epsilons.is_empty() {
                    return Err(ConfigError::EmptyTypes);
                }
                if epsilons.len() != sigmas.len() {
                    return Err(ConfigError::RaggedTypeParameters {
                        epsilons: epsilons.len(),
                        sigmas: sigmas.len(),
                    });
                }
                let ntypes = epsilons.len();
                let mut c6 = Vec::with_capacity(ntypes * ntypes);
                let mut c12 = Vec::with_capacity(ntypes * ntypes);
                for i in 0..ntypes {
                    for j in 0..ntypes {
                        let (a, b) =
                            rule.combine((epsilons[i], sigmas[i]), (epsilons[j], sigmas[j]));
                        c6.push(a);
                        c12.push(b);
                    }
                }
                Ok(LjTable { ntypes, c6, c12 })
            }
        }
    }
}

/// Resolved per-type-pair Lennard-Jones coefficients.
///
/// Whatever the input form, the inner loop only ever gathers from this flat
/// matrix, so combination rules cost nothing per pair.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct LjTable {
    ntypes: usize,
    c6: Vec<f64>,
    c12: Vec<f64>,
}

impl LjTable {
    /// Number of particle types
    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    /// (c6, c12) for a type pair
    #[inline]
    pub fn pair(&self, type_i: usize, type_j: usize) -> (f64, f64) {
        let idx = type_i * self.ntypes + type_j;
        (self.c6[idx], self.c12[idx])
    }
}

/// User-level non-bonded configuration, validated into a [`ForceField`]
///
/// # Examples
/// ~~~
/// use pairforce::{CoulombModel, ForceField, LjParameters, NonbondedConfig, VdwModel};
/// let config = NonbondedConfig::new(
///     CoulombModel::ReactionField { epsilon_rf: 78.0 },
///     VdwModel::PotentialShift,
///     1.2,
///     LjParameters::PairMatrix { ntypes: 1, c6: vec![1e-3], c12: vec![1e-6] },
/// );
/// let field = ForceField::new(config).unwrap();
/// assert!(field.table().is_none()); // closed-form models need no table
/// ~~~
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct NonbondedConfig {
    /// Electrostatics model
    pub coulomb: CoulombModel,
    /// Lennard-Jones truncation model
    pub vdw: VdwModel,
    /// Cutoff radius r꜀
    pub cutoff: f64,
    /// Switch-on radius r₁ for switched/shifted models; defaults to r꜀
    pub switch_radius: Option<f64>,
    /// Electrostatic prefactor multiplying qᵢqⱼ/r
    pub prefactor: f64,
    /// Lennard-Jones parameters
    pub lj: LjParameters,
    /// Table resolution override; defaults to [`DEFAULT_TABLE_SCALE`]
    pub table_scale: Option<f64>,
}

impl NonbondedConfig {
    /// New configuration with default prefactor, switch radius, and table scale
    pub fn new(coulomb: CoulombModel, vdw: VdwModel, cutoff: f64, lj: LjParameters) -> Self {
        Self {
            coulomb,
            vdw,
            cutoff,
            switch_radius: None,
            prefactor: ELECTRIC_PREFACTOR,
            lj,
            table_scale: None,
        }
    }

    /// Set the switch-on radius
    pub fn with_switch_radius(mut self, r1: f64) -> Self {
        self.switch_radius = Some(r1);
        self
    }

    /// Set the electrostatic prefactor (e.g. 1.0 for reduced units)
    pub fn with_prefactor(mut self, prefactor: f64) -> Self {
        self.prefactor = prefactor;
        self
    }

    /// Set the table resolution
    pub fn with_table_scale(mut self, table_scale: f64) -> Self {
        self.table_scale = Some(table_scale);
        self
    }
}

/// Validated force field with all derived constants resolved.
///
/// Construction is the single fallible step: the kernel consumes this object
/// read-only and by then every model parameter, table, and coefficient matrix
/// is known to be consistent.
#[derive(Clone, Debug)]
pub struct ForceField {
    coulomb: CoulombModel,
    vdw: VdwModel,
    rc: f64,
    r1: f64,
    facel: f64,
    k_rf: f64,
    c_rf: f64,
    ewald_beta: f64,
    /// Potential-shift constant r꜀⁻⁶; zero unless vdw = PotentialShift
    sh_invrc6: f64,
    lj: LjTable,
    switch: SwitchFunction,
    table: Option<PairTable>,
}

impl ForceField {
    /// Validate a configuration and derive all run constants
    pub fn new(config: NonbondedConfig) -> Result<Self, ConfigError> {
        let rc = config.cutoff;
        if !(rc.is_finite() && rc > 0.0) {
            return Err(ConfigError::InvalidCutoff(rc));
        }
        let r1 = config.switch_radius.unwrap_or(rc);
        if !(r1 > 0.0 && r1 <= rc) {
            return Err(ConfigError::InvalidSwitchRadius { r1, rc });
        }
        let tabscale = config.table_scale.unwrap_or(DEFAULT_TABLE_SCALE);
        if !(tabscale.is_finite() && tabscale > 0.0) {
            return Err(ConfigError::InvalidTableScale(tabscale));
        }

        let (k_rf, c_rf) = match config.coulomb {
            CoulombModel::ReactionField { epsilon_rf } => {
                if epsilon_rf < 0.0 {
                    return Err(ConfigError::InvalidDielectric(epsilon_rf));
                }
                // epsilon_rf = 0 denotes an infinite dielectric
                let k_rf = if epsilon_rf == 0.0 {
                    0.5 / rc.powi(3)
                } else {
                    (epsilon_rf - 1.0) / (2.0 * epsilon_rf + 1.0) / rc.powi(3)
                };
                (k_rf, 1.0 / rc + k_rf * rc * rc)
            }
            _ => (0.0, 0.0),
        };
        let ewald_beta = match config.coulomb {
            CoulombModel::Ewald { beta } => {
                if !(beta.is_finite() && beta > 0.0) {
                    return Err(ConfigError::InvalidEwaldCoefficient(beta));
                }
                beta
            }
            _ => 0.0,
        };

        let lj = config.lj.resolve()?;
        let switch = SwitchFunction::new(r1, rc);
        let sh_invrc6 = match config.vdw {
            VdwModel::PotentialShift => rc.powi(-6),
            _ => 0.0,
        };

        let coulomb_kind = match config.coulomb {
            CoulombModel::Shifted => TableKind::ShiftedCoulomb,
            CoulombModel::Switched => TableKind::CoulombSwitch,
            CoulombModel::ReactionField { .. } => TableKind::ReactionField,
            CoulombModel::Cutoff | CoulombModel::Ewald { .. } => TableKind::Coulomb,
        };
        let (disp_kind, rep_kind) = match config.vdw {
            VdwModel::Switched => (TableKind::DispersionSwitch, TableKind::RepulsionSwitch),
            _ => (TableKind::Dispersion, TableKind::Repulsion),
        };
        let needs_table = matches!(
            config.coulomb,
            CoulombModel::Shifted | CoulombModel::Switched
        ) || config.vdw == VdwModel::Switched;
        let table = needs_table.then(|| {
            let params = TableParams { rc, r1, k_rf, c_rf };
            PairTable::build(&params, [coulomb_kind, disp_kind, rep_kind], tabscale)
        });

        Ok(Self {
            coulomb: config.coulomb,
            vdw: config.vdw,
            rc,
            r1,
            facel: config.prefactor,
            k_rf,
            c_rf,
            ewald_beta,
            sh_invrc6,
            lj,
            switch,
            table,
        })
    }

    /// Electrostatics model
    pub fn coulomb_model(&self) -> CoulombModel {
        self.coulomb
    }

    /// Lennard-Jones truncation model
    pub fn vdw_model(&self) -> VdwModel {
        self.vdw
    }

    /// Switch-on radius r₁
    pub fn switch_radius(&self) -> f64 {
        self.r1
    }

    /// Electrostatic prefactor
    pub fn prefactor(&self) -> f64 {
        self.facel
    }

    /// Reaction-field constants (k_rf, c_rf); zero for other models
    pub fn reaction_field(&self) -> (f64, f64) {
        (self.k_rf, self.c_rf)
    }

    /// Ewald splitting coefficient β; zero for other models
    pub fn ewald_beta(&self) -> f64 {
        self.ewald_beta
    }

    /// Lennard-Jones potential-shift constant r꜀⁻⁶; zero unless shifted
    pub fn vdw_shift(&self) -> f64 {
        self.sh_invrc6
    }

    /// Resolved Lennard-Jones coefficient matrix
    pub fn lj(&self) -> &LjTable {
        &self.lj
    }

    /// Switching window (identity for non-switched models)
    pub fn switch(&self) -> &SwitchFunction {
        &self.switch
    }

    /// Interpolation tables, present only for tabulated models
    pub fn table(&self) -> Option<&PairTable> {
        self.table.as_ref()
    }

    /// True when the Coulomb interaction goes through the table
    pub fn coulomb_is_tabulated(&self) -> bool {
        matches!(self.coulomb, CoulombModel::Shifted | CoulombModel::Switched)
    }

    /// True when the Lennard-Jones interaction goes through the table
    pub fn vdw_is_tabulated(&self) -> bool {
        self.vdw == VdwModel::Switched
    }

    /// Per-charge-squared Coulomb self-energy factor, subtracted once per
    /// particle for diagonal cluster pairs.
    ///
    /// Reaction field: ½·c_rf (which also covers plain cutoff, where it is
    /// zero). Ewald: β/√π. Tabulated models: half the tabulated potential at
    /// the origin, which is zero for internally generated tables since the
    /// excluded 1/r is never folded into them.
    pub fn coulomb_self_factor(&self) -> f64 {
        if self.coulomb_is_tabulated() {
            return 0.5
                * self
                    .table
                    .as_ref()
                    .map(|t| t.coulomb_origin())
                    .unwrap_or(0.0);
        }
        match self.coulomb {
            CoulombModel::Ewald { beta } => beta / PI.sqrt(),
            _ => 0.5 * self.c_rf,
        }
    }
}

impl Cutoff for ForceField {
    fn cutoff(&self) -> f64 {
        self.rc
    }
}
