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

//! # Pairforce
//!
//! A library for evaluating non-bonded pair interactions in particle
//! simulations: Lennard-Jones and Coulomb forces over cluster-based
//! neighbor lists, with tabulated potentials, smooth switching functions,
//! and reaction-field or Ewald real-space electrostatics.
//!
//! The crate is organised bottom up:
//!
//! - [`switch`] — polynomial switching function and its derivatives,
//! - [`table`] — cubic-spline potential tables and their construction,
//! - [`config`] — force-field configuration and validation,
//! - [`kernel`] — the cluster-pair force kernel (scalar and SIMD).

#[cfg(test)]
extern crate approx;

/// A point in 3D space
pub type Vector3 = nalgebra::Vector3<f64>;

pub mod config;
pub mod kernel;
pub mod switch;
pub mod table;

pub use config::{
    CombinationRule, ConfigError, CoulombModel, ForceField, LjParameters, NonbondedConfig,
    VdwModel,
};

use num::{Float, NumCast};
use physical_constants::{AVOGADRO_CONSTANT, ELEMENTARY_CHARGE, VACUUM_ELECTRIC_PERMITTIVITY};
use std::f64::consts::PI;

/// Electrostatic prefactor, e²/4πε₀ × 10⁷ × NA (Å × kJ / mol).
///
/// Multiplies the product of two unit-less charge numbers divided by their
/// separation in ångström to give an interaction energy in kJ/mol:
///
/// Examples:
/// ```
/// use pairforce::ELECTRIC_PREFACTOR;
/// let z1 = 1.0;                    // unit-less charge number
/// let z2 = -1.0;                   // unit-less charge number
/// let r = 7.0;                     // separation in angstrom
/// let rel_dielectric_const = 80.0; // relative dielectric constant
/// let energy = ELECTRIC_PREFACTOR * z1 * z2 / (rel_dielectric_const * r);
/// assert_eq!(energy, -2.48099031507825); // in kJ/mol
/// ```
pub const ELECTRIC_PREFACTOR: f64 =
    ELEMENTARY_CHARGE * ELEMENTARY_CHARGE * 1.0e10 * AVOGADRO_CONSTANT * 1e-3
        / (4.0 * PI * VACUUM_ELECTRIC_PERMITTIVITY);

/// Defines a cutoff distance
pub trait Cutoff {
    /// Squared cutoff distance
    fn cutoff_squared(&self) -> f64 {
        self.cutoff().powi(2)
    }

    /// Cutoff distance
    fn cutoff(&self) -> f64;
}

/// Scheme metadata used for table dumps and user-facing diagnostics
pub trait Info {
    /// Digital Object Identifier of the main reference for the scheme
    fn citation(&self) -> Option<&'static str> {
        None
    }
    /// Short, machine-friendly name of the scheme
    fn short_name(&self) -> Option<&'static str> {
        None
    }
}

/// See Pythagorean means on [Wikipedia](https://en.wikipedia.org/wiki/Pythagorean_means)
pub(crate) fn geometric_mean<T: Float>(values: (T, T)) -> T {
    T::sqrt(values.0 * values.1)
}

/// See Pythagorean means on [Wikipedia](https://en.wikipedia.org/wiki/Pythagorean_means)
pub(crate) fn arithmetic_mean<T: Float>(values: (T, T)) -> T {
    (values.0 + values.1) * NumCast::from(0.5).unwrap()
}

/// Complementary error function, erfc(x) = 1 - erf(x).
///
/// Rational Chebyshev approximation with a relative error below 1.2 × 10⁻⁷
/// everywhere (Press et al., *Numerical Recipes*, 3rd ed., §6.2).
/// Sufficient for real-space Ewald force evaluation where the splitting
/// function itself is an approximation of the same order.
pub fn erfc_x(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * x.abs());
    let tau = t
        * (-x * x - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        tau
    } else {
        2.0 - tau
    }
}
