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

//! ## Tabulated pair potentials
//!
//! Construction of cubic-interpolation tables for pair potentials that the
//! force kernel cannot (or should not) evaluate in closed form, e.g. switched
//! or shift-corrected interactions. Each potential is sampled with analytic
//! second derivatives on a uniform grid, then re-packed into four Horner
//! coefficients per interval so a single fused lookup yields both potential
//! and force.
//!
//! Tables store the force *divided by r*, so the kernel can multiply the
//! looked-up value directly with the distance-vector components.

use crate::switch::SwitchFunction;
use crate::Info;
use itertools::izip;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::ops::Range;

pub mod spline;

/// Default table resolution in points per unit distance.
///
/// 2000 points per distance unit keeps the cubic-interpolation error well
/// below double-precision force-accuracy requirements.
pub const DEFAULT_TABLE_SCALE: f64 = 2000.0;

/// Extra tabulated range beyond the cutoff, in distance units. Pair lists
/// may contain pairs slightly beyond the cutoff between rebuilds.
const TABLE_MARGIN: f64 = 0.5;

/// First sampled grid index; entries below are zero and never reached since
/// physical separations at `r < 10/tabscale` are excluded or singular.
const FIRST_SAMPLE: usize = 10;

/// Potential forms that can be tabulated
///
/// The non-switched Coulomb family differs only in its long-range
/// correction: plain `1/r`, reaction field, or the cutoff-shifted form whose
/// force is smoothly taken to zero between `r1` and `rc` by a cubic/quartic
/// polynomial correction. The switched variants multiply the plain form by
/// the [`SwitchFunction`] window instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum TableKind {
    /// Dispersion attraction, $V = -r^{-6}$
    Dispersion,
    /// Repulsion, $V = r^{-12}$
    Repulsion,
    /// Plain Coulomb, $V = 1/r$
    Coulomb,
    /// Reaction field, $V = 1/r + k_{rf} r^2 - c_{rf}$
    ReactionField,
    /// Coulomb with polynomial force-shift correction active between r₁ and r꜀
    ShiftedCoulomb,
    /// Dispersion multiplied by the switching window
    DispersionSwitch,
    /// Repulsion multiplied by the switching window
    RepulsionSwitch,
    /// Coulomb multiplied by the switching window
    CoulombSwitch,
}

impl TableKind {
    /// True for kinds multiplied by the switching window
    pub fn is_switched(&self) -> bool {
        matches!(
            self,
            TableKind::DispersionSwitch | TableKind::RepulsionSwitch | TableKind::CoulombSwitch
        )
    }

    /// True for kinds whose analytic form is identically zero beyond the cutoff
    fn truncated_at_cutoff(&self) -> bool {
        self.is_switched() || matches!(self, TableKind::ShiftedCoulomb)
    }
}

impl Info for TableKind {
    fn short_name(&self) -> Option<&'static str> {
        Some(match self {
            TableKind::Dispersion => "lj6",
            TableKind::Repulsion => "lj12",
            TableKind::Coulomb => "coul",
            TableKind::ReactionField => "rf",
            TableKind::ShiftedCoulomb => "coul-shift",
            TableKind::DispersionSwitch => "lj6-switch",
            TableKind::RepulsionSwitch => "lj12-switch",
            TableKind::CoulombSwitch => "coul-switch",
        })
    }
}

/// Uniform sampling grid with abscissas $x_i = i / \textrm{tabscale}$
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TableGrid {
    tabscale: f64,
    n: usize,
}

impl TableGrid {
    /// Grid covering `[0, rc + margin]` at the given resolution
    pub fn new(rc: f64, tabscale: f64) -> Self {
        let n = ((rc + TABLE_MARGIN) * tabscale) as usize;
        Self { tabscale, n }
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        self.n
    }

    /// True if the grid holds no points
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Grid spacing, 1/tabscale
    pub fn spacing(&self) -> f64 {
        1.0 / self.tabscale
    }

    /// Points per unit distance
    pub fn tabscale(&self) -> f64 {
        self.tabscale
    }

    /// Abscissa of grid point `i`
    #[inline]
    pub fn x(&self, i: usize) -> f64 {
        i as f64 / self.tabscale
    }

    /// Index range of sampled points; entries below the range start stay zero
    pub fn sample_range(&self) -> Range<usize> {
        FIRST_SAMPLE..self.n
    }

    /// All abscissas, including the unsampled near-zero region
    pub fn abscissas(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.x(i)).collect()
    }
}

/// Cutoff geometry and reaction-field constants needed to sample a table
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TableParams {
    /// Cutoff radius, r꜀
    pub rc: f64,
    /// Switch-on or shift-on radius, r₁ (equal to r꜀ when unused)
    pub r1: f64,
    /// Reaction-field curvature constant
    pub k_rf: f64,
    /// Reaction-field offset constant
    pub c_rf: f64,
}

impl TableParams {
    /// Coefficients (A, B, C) of the shifted-Coulomb force correction.
    ///
    /// A and B solve $F(r_c) = 0$ and $F'(r_c) = 0$ for
    /// $F = 1/r^2 + A(r-r_1)^2 + B(r-r_1)^3$; C shifts the potential so it
    /// vanishes at the cutoff. The degenerate window `r1 >= rc` drops the
    /// polynomial part and keeps only the plain `1/rc` potential shift.
    pub fn shift_coefficients(&self) -> (f64, f64, f64) {
        let d = self.rc - self.r1;
        if d <= 0.0 {
            return (0.0, 0.0, 1.0 / self.rc);
        }
        let rc3 = self.rc.powi(3);
        let a = -(5.0 * self.rc - 2.0 * self.r1) / (rc3 * d * d);
        let b = (4.0 * self.rc - 2.0 * self.r1) / (rc3 * d * d * d);
        let c = 1.0 / self.rc - a / 3.0 * d.powi(3) - b / 4.0 * d.powi(4);
        (a, b, c)
    }
}

/// One potential sampled on a grid: value, force, and their second derivatives
#[derive(Clone, Debug, Default)]
pub struct SampledTable {
    /// Potential V(r)
    pub v: Vec<f64>,
    /// Second derivative V″(r)
    pub v2: Vec<f64>,
    /// Force magnitude divided by r, i.e. −V′(r)/r
    pub f: Vec<f64>,
    /// Second derivative of the force, divided by r
    pub f2: Vec<f64>,
}

/// Sample a potential kind on a grid with analytic derivatives.
///
/// Evaluates V, V″, F = −V′ and F″ in closed form at every grid point in
/// `grid.sample_range()`. Switched kinds are multiplied by the smooth
/// switching window for `r > r1` through the full chain-rule expansion,
///
/// $$ (Vs)''' = V'''s + 3V''s' + 3V's'' + Vs''' $$
///
/// and correspondingly for the lower orders; getting any coefficient wrong
/// makes the tabulated force discontinuous at `r1`. As a final step both
/// force rows are divided by `r` so the kernel multiplies lookups directly
/// with distance-vector components.
pub fn sample_table(kind: TableKind, grid: &TableGrid, params: &TableParams) -> SampledTable {
    let n = grid.len();
    let mut out = SampledTable {
        v: vec![0.0; n],
        v2: vec![0.0; n],
        f: vec![0.0; n],
        f2: vec![0.0; n],
    };
    let switch = if kind.is_switched() {
        SwitchFunction::new(params.r1, params.rc)
    } else {
        SwitchFunction::identity(params.rc)
    };
    let (shift_a, shift_b, shift_c) = params.shift_coefficients();

    for i in grid.sample_range() {
        let r = grid.x(i);
        let r2 = r * r;
        let inv_r = 1.0 / r;
        let inv_r2 = 1.0 / r2;
        let within_cutoff = r < params.rc;

        let (mut v, mut f, mut v2, mut f2) = (0.0, 0.0, 0.0, 0.0);
        match kind {
            TableKind::Dispersion | TableKind::DispersionSwitch => {
                if !kind.truncated_at_cutoff() || within_cutoff {
                    v = -inv_r2.powi(3);
                    f = 6.0 * v * inv_r;
                    v2 = 7.0 * f * inv_r;
                    f2 = 8.0 * v2 * inv_r;
                }
            }
            TableKind::Repulsion | TableKind::RepulsionSwitch => {
                if !kind.truncated_at_cutoff() || within_cutoff {
                    v = inv_r2.powi(6);
                    f = 12.0 * v * inv_r;
                    v2 = 13.0 * f * inv_r;
                    f2 = 14.0 * v2 * inv_r;
                }
            }
            TableKind::Coulomb | TableKind::CoulombSwitch => {
                if !kind.truncated_at_cutoff() || within_cutoff {
                    v = inv_r;
                    f = inv_r2;
                    v2 = 2.0 * inv_r2 * inv_r;
                    f2 = 6.0 * inv_r2 * inv_r2;
                }
            }
            TableKind::ReactionField => {
                v = inv_r + params.k_rf * r2 - params.c_rf;
                f = inv_r2 - 2.0 * params.k_rf * r;
                v2 = 2.0 * inv_r2 * inv_r + 2.0 * params.k_rf;
                f2 = 6.0 * inv_r2 * inv_r2;
            }
            TableKind::ShiftedCoulomb => {
                if within_cutoff {
                    v = inv_r - shift_c;
                    f = inv_r2;
                    v2 = 2.0 * inv_r2 * inv_r;
                    f2 = 6.0 * inv_r2 * inv_r2;
                    if r > params.r1 {
                        let dr = r - params.r1;
                        let dr2 = dr * dr;
                        let dr3 = dr2 * dr;
                        v += -shift_a / 3.0 * dr3 - shift_b / 4.0 * dr2 * dr2;
                        f += shift_a * dr2 + shift_b * dr3;
                        v2 += -2.0 * shift_a * dr - 3.0 * shift_b * dr2;
                        f2 += 2.0 * shift_a + 6.0 * shift_b * dr;
                    }
                }
            }
        }

        if kind.is_switched() && r > switch.switch_radius() {
            let [s, s1, s2, s3] = switch.derivatives(r);
            // Derivatives of the base potential from the force rows
            let vt = v;
            let vt1 = -f;
            let vt2 = v2;
            let vt3 = -f2;
            v = vt * s;
            f = -(vt1 * s + vt * s1);
            v2 = vt2 * s + 2.0 * vt1 * s1 + vt * s2;
            f2 = -(vt3 * s + 3.0 * vt2 * s1 + 3.0 * vt1 * s2 + vt * s3);
        }

        out.v[i] = v;
        out.v2[i] = v2;
        out.f[i] = f * inv_r;
        out.f2[i] = f2 * inv_r;
    }
    out
}

/// Re-pack sampled values and second derivatives into Horner coefficients.
///
/// Each interval `[xᵢ, xᵢ₊₁]` becomes `[Y, F, G, H]` so that the cubic at
/// fractional position ε within the interval is
/// `Y + ε(F + ε(G + εH))`, see [`spline::eval_packed_interval`]. When
/// `zero_beyond` is given, intervals whose midpoint lies at or past that
/// radius are zeroed entirely, hard-truncating the table independent of the
/// analytic falloff.
pub fn pack_coefficients(
    grid: &TableGrid,
    y: &[f64],
    y2: &[f64],
    zero_beyond: Option<f64>,
) -> Vec<[f64; 4]> {
    let h = grid.spacing();
    let h2_6 = h * h / 6.0;
    let mut dest = vec![[0.0; 4]; y.len()];
    for (i, (yw, y2w)) in izip!(y.windows(2), y2.windows(2)).enumerate() {
        if let Some(rz) = zero_beyond {
            if grid.x(i) + 0.5 * h >= rz {
                continue;
            }
        }
        let f = yw[1] - yw[0] - h2_6 * (2.0 * y2w[0] + y2w[1]);
        let g = 3.0 * h2_6 * y2w[0];
        let hh = h2_6 * (y2w[1] - y2w[0]);
        dest[i] = [yw[0], f, g, hh];
    }
    dest
}

#[inline]
fn eval_packed(coeffs: &[[f64; 4]], tabscale: f64, r: f64) -> f64 {
    let rt = r * tabscale;
    let i = (rt as usize).min(coeffs.len() - 1);
    let eps = rt - i as f64;
    let [y, f, g, h] = coeffs[i];
    y + eps * (f + eps * (g + eps * h))
}

/// Packed interpolation tables for one force-field configuration
///
/// Holds the Coulomb, dispersion, and repulsion columns in packed Horner
/// form, each as a potential table and a force-over-r table. Built once at
/// setup, then shared read-only by all kernel workers.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct PairTable {
    tabscale: f64,
    kinds: [TableKind; 3],
    coulomb_v: Vec<[f64; 4]>,
    coulomb_f: Vec<[f64; 4]>,
    dispersion_v: Vec<[f64; 4]>,
    dispersion_f: Vec<[f64; 4]>,
    repulsion_v: Vec<[f64; 4]>,
    repulsion_f: Vec<[f64; 4]>,
}

impl PairTable {
    /// Build packed tables for the given Coulomb, dispersion, and repulsion kinds
    pub fn build(params: &TableParams, kinds: [TableKind; 3], tabscale: f64) -> Self {
        let grid = TableGrid::new(params.rc, tabscale);
        let mut columns = kinds.iter().map(|&kind| {
            let zero_beyond = kind.truncated_at_cutoff().then_some(params.rc);
            let sampled = sample_table(kind, &grid, params);
            let v = pack_coefficients(&grid, &sampled.v, &sampled.v2, zero_beyond);
            let f = pack_coefficients(&grid, &sampled.f, &sampled.f2, zero_beyond);
            (v, f)
        });
        let (coulomb_v, coulomb_f) = columns.next().unwrap();
        let (dispersion_v, dispersion_f) = columns.next().unwrap();
        let (repulsion_v, repulsion_f) = columns.next().unwrap();
        Self {
            tabscale,
            kinds,
            coulomb_v,
            coulomb_f,
            dispersion_v,
            dispersion_f,
            repulsion_v,
            repulsion_f,
        }
    }

    /// Table resolution in points per unit distance
    pub fn tabscale(&self) -> f64 {
        self.tabscale
    }

    /// Tabulated kinds in column order (coulomb, dispersion, repulsion)
    pub fn kinds(&self) -> [TableKind; 3] {
        self.kinds
    }

    /// Coulomb potential and force/r at separation `r`
    #[inline]
    pub fn coulomb_vf(&self, r: f64) -> (f64, f64) {
        (
            eval_packed(&self.coulomb_v, self.tabscale, r),
            eval_packed(&self.coulomb_f, self.tabscale, r),
        )
    }

    /// Dispersion potential and force/r at separation `r`
    #[inline]
    pub fn dispersion_vf(&self, r: f64) -> (f64, f64) {
        (
            eval_packed(&self.dispersion_v, self.tabscale, r),
            eval_packed(&self.dispersion_f, self.tabscale, r),
        )
    }

    /// Repulsion potential and force/r at separation `r`
    #[inline]
    pub fn repulsion_vf(&self, r: f64) -> (f64, f64) {
        (
            eval_packed(&self.repulsion_v, self.tabscale, r),
            eval_packed(&self.repulsion_f, self.tabscale, r),
        )
    }

    /// Coulomb potential at the table origin, used for self-energy terms.
    ///
    /// Zero for internally generated tables since the near-zero region is
    /// never sampled.
    pub(crate) fn coulomb_origin(&self) -> f64 {
        self.coulomb_v[0][0]
    }
}

/// Write a plain-text diagnostic dump of one tabulated potential.
///
/// Emits `r value derivative` lines at quarter-grid-spacing resolution via
/// the spline evaluation path. A debugging aid, not part of the force path.
pub fn dump_table<W: Write>(
    writer: &mut W,
    kind: TableKind,
    grid: &TableGrid,
    params: &TableParams,
) -> io::Result<()> {
    let sampled = sample_table(kind, grid, params);
    let x = grid.abscissas();
    let h = grid.spacing();
    if let Some(name) = kind.short_name() {
        writeln!(writer, "# {}", name)?;
    }
    for i in grid.sample_range().take(grid.len() - FIRST_SAMPLE - 1) {
        for quarter in 0..4 {
            let q = grid.x(i) + 0.25 * quarter as f64 * h;
            let (value, derivative) = spline::eval_spline(&x, &sampled.v, &sampled.v2, q);
            writeln!(writer, "{:.10e} {:.10e} {:.10e}", q, value, derivative)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RC: f64 = 1.2;
    const R1: f64 = 0.9;

    fn reaction_field_params() -> TableParams {
        // Conducting boundary: k_rf = 1/(2 rc³), c_rf = 1/rc + k_rf rc²
        let k_rf = 0.5 / RC.powi(3);
        TableParams {
            rc: RC,
            r1: RC,
            k_rf,
            c_rf: 1.0 / RC + k_rf * RC * RC,
        }
    }

    fn plain_params() -> TableParams {
        TableParams {
            rc: RC,
            r1: R1,
            k_rf: 0.0,
            c_rf: 0.0,
        }
    }

    fn numeric_dv(table: &PairTable, r: f64) -> f64 {
        let h = 1e-5;
        let (v_hi, _) = table.coulomb_vf(r + h);
        let (v_lo, _) = table.coulomb_vf(r - h);
        (v_hi - v_lo) / (2.0 * h)
    }

    #[test]
    fn test_force_is_negative_potential_derivative() {
        let params = reaction_field_params();
        let table = PairTable::build(
            &params,
            [
                TableKind::ReactionField,
                TableKind::Dispersion,
                TableKind::Repulsion,
            ],
            DEFAULT_TABLE_SCALE,
        );
        for &r in &[0.3, 0.5, 0.8, 1.0, 1.15] {
            // Force column stores -V'/r
            let (_, f_over_r) = table.coulomb_vf(r);
            assert_relative_eq!(f_over_r * r, -numeric_dv(&table, r), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_plain_coulomb_closed_form() {
        let table = PairTable::build(
            &plain_params(),
            [
                TableKind::Coulomb,
                TableKind::Dispersion,
                TableKind::Repulsion,
            ],
            DEFAULT_TABLE_SCALE,
        );
        let (v, f_over_r) = table.coulomb_vf(1.0);
        assert_relative_eq!(v, 1.0, epsilon = 1e-9);
        assert_relative_eq!(f_over_r, 1.0, epsilon = 1e-8);
        let (v6, f6) = table.dispersion_vf(0.8);
        assert_relative_eq!(v6, -0.8_f64.powi(-6), epsilon = 1e-8);
        assert_relative_eq!(f6 * 0.8, -6.0 * 0.8_f64.powi(-7), epsilon = 1e-5);
        let (v12, _) = table.repulsion_vf(0.8);
        assert_relative_eq!(v12, 0.8_f64.powi(-12), epsilon = 1e-7);
    }

    #[test]
    fn test_reaction_field_vanishes_at_cutoff() {
        let params = reaction_field_params();
        let grid = TableGrid::new(RC, DEFAULT_TABLE_SCALE);
        let sampled = sample_table(TableKind::ReactionField, &grid, &params);
        let i = (RC * DEFAULT_TABLE_SCALE) as usize;
        assert_relative_eq!(sampled.v[i], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_switched_coulomb_continuous_at_boundaries() {
        let params = plain_params();
        let table = PairTable::build(
            &params,
            [
                TableKind::CoulombSwitch,
                TableKind::DispersionSwitch,
                TableKind::RepulsionSwitch,
            ],
            DEFAULT_TABLE_SCALE,
        );
        // Below r1 the switched table is the bare potential
        let (v, f) = table.coulomb_vf(0.7);
        assert_relative_eq!(v, 1.0 / 0.7, epsilon = 1e-8);
        assert_relative_eq!(f * 0.7, 1.0 / (0.7 * 0.7), epsilon = 1e-6);
        // Continuity across the switch-on radius
        let (v_lo, f_lo) = table.coulomb_vf(R1 - 1e-4);
        let (v_hi, f_hi) = table.coulomb_vf(R1 + 1e-4);
        assert_relative_eq!(v_lo, v_hi, epsilon = 1e-3);
        assert_relative_eq!(f_lo, f_hi, epsilon = 1e-2);
        // Both potential and force vanish at the cutoff; the force only
        // decays linearly in (rc - r), so check the trend as well
        let (v_rc, f_rc) = table.coulomb_vf(RC - 1e-4);
        assert_relative_eq!(v_rc, 0.0, epsilon = 1e-6);
        assert_relative_eq!(f_rc, 0.0, epsilon = 1e-2);
        let (_, f_far) = table.coulomb_vf(RC - 1e-2);
        assert!(f_rc.abs() < f_far.abs());
    }

    #[test]
    fn test_shifted_coulomb_force_vanishes_at_cutoff() {
        let params = plain_params();
        let (a, b, _) = params.shift_coefficients();
        let d = RC - R1;
        // The correction polynomial takes the force smoothly to zero
        let f_rc = 1.0 / (RC * RC) + a * d * d + b * d * d * d;
        assert_relative_eq!(f_rc, 0.0, epsilon = 1e-12);
        let df_rc = -2.0 / RC.powi(3) + 2.0 * a * d + 3.0 * b * d * d;
        assert_relative_eq!(df_rc, 0.0, epsilon = 1e-12);
        // And the potential vanishes there too
        let grid = TableGrid::new(RC, DEFAULT_TABLE_SCALE);
        let sampled = sample_table(TableKind::ShiftedCoulomb, &grid, &params);
        let i = (RC * DEFAULT_TABLE_SCALE) as usize - 1;
        assert_relative_eq!(sampled.v[i], 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_zero_beyond_truncates_intervals() {
        let grid = TableGrid::new(RC, 100.0);
        let y: Vec<f64> = (0..grid.len()).map(|i| grid.x(i)).collect();
        let y2 = vec![0.0; grid.len()];
        let packed = pack_coefficients(&grid, &y, &y2, Some(0.5));
        let idx_inside = (0.4 * 100.0) as usize;
        let idx_outside = (0.6 * 100.0) as usize;
        assert_ne!(packed[idx_inside], [0.0; 4]);
        assert_eq!(packed[idx_outside], [0.0; 4]);
    }

    #[test]
    fn test_dump_is_well_formed() {
        let grid = TableGrid::new(0.5, 100.0);
        let mut buffer = Vec::new();
        dump_table(&mut buffer, TableKind::Coulomb, &grid, &plain_params()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut previous_r = 0.0;
        let mut rows = 0;
        for line in text.lines().filter(|l| !l.starts_with('#')) {
            let cols: Vec<f64> = line.split_whitespace().map(|c| c.parse().unwrap()).collect();
            assert_eq!(cols.len(), 3);
            assert!(cols[0] > previous_r);
            previous_r = cols[0];
            rows += 1;
        }
        // Four quarter-spaced rows per sampled interval
        assert_eq!(rows, 4 * (grid.len() - 11));
    }
}
