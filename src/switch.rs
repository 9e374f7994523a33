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

//! ## Switching function
//!
//! Smooth attenuation of a pair potential between a switch-on radius,
//! _r₁_, and the cutoff, _r꜀_. Multiplying a potential by the switching
//! function forces both the potential and the force to zero at the cutoff,
//! removing the energy drift a hard truncation would cause.

use crate::Cutoff;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Polynomial switching function
///
/// $$ s(r) = (r_c-r)^2 (r_c+2r-3r_1) \cdot k \quad\textrm{with}\quad k = (r_c-r_1)^{-3} $$
///
/// for $r_1 < r < r_c$; unity below $r_1$ and zero beyond $r_c$.
/// By construction $s(r_1) = 1$, $s'(r_1) = 0$, and both $s$ and $s'$ vanish
/// at the cutoff, so a switched potential and its force are continuous at
/// both ends of the switching window.
///
/// Derivatives up to third order are exposed since tabulating a switched
/// potential requires the chain-rule expansion
/// $(V s)''' = V'''s + 3V''s' + 3V's'' + Vs'''$, see
/// [`crate::table::sample_table`].
///
/// The degenerate case $r_1 = r_c$ sets $k = 0$ and the function collapses
/// to the identity, i.e. a plain cutoff without switching.
///
/// # Examples:
/// ~~~
/// use pairforce::switch::SwitchFunction;
/// let switch = SwitchFunction::new(0.9, 1.2);
/// assert_eq!(switch.value(0.5), 1.0);     // below r₁: untouched
/// assert_eq!(switch.value(1.2), 0.0);     // at cutoff: fully damped
/// assert!(switch.value(1.05) > 0.0 && switch.value(1.05) < 1.0);
/// ~~~
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SwitchFunction {
    /// Switch-on radius, r₁
    r1: f64,
    /// Cutoff radius, r꜀
    rc: f64,
    /// Curvature coefficient, k = (r꜀ - r₁)⁻³; zero in the degenerate case
    ksw: f64,
}

impl SwitchFunction {
    /// Create a switching window between `r1` and `rc`.
    ///
    /// `r1 == rc` gives the degenerate, identity switch. Radius ordering is
    /// validated by [`crate::config::NonbondedConfig`]; this constructor
    /// assumes `r1 <= rc`.
    pub fn new(r1: f64, rc: f64) -> Self {
        let ksw = if r1 < rc {
            (rc - r1).powi(-3)
        } else {
            0.0
        };
        Self { r1, rc, ksw }
    }

    /// Identity switch: s ≡ 1 below the cutoff
    pub fn identity(rc: f64) -> Self {
        Self::new(rc, rc)
    }

    /// True if the switch is the degenerate identity
    pub fn is_identity(&self) -> bool {
        self.ksw == 0.0
    }

    /// Switch-on radius r₁
    pub fn switch_radius(&self) -> f64 {
        self.r1
    }

    /// Switching function value, s(r)
    #[inline]
    pub fn value(&self, r: f64) -> f64 {
        if self.ksw == 0.0 || r <= self.r1 {
            1.0
        } else if r >= self.rc {
            0.0
        } else {
            (self.rc - r).powi(2) * (self.rc + 2.0 * r - 3.0 * self.r1) * self.ksw
        }
    }

    /// First derivative, s'(r)
    #[inline]
    pub fn derivative(&self, r: f64) -> f64 {
        if self.ksw == 0.0 || r <= self.r1 || r >= self.rc {
            0.0
        } else {
            6.0 * (self.rc - r) * (self.r1 - r) * self.ksw
        }
    }

    /// Second derivative, s''(r)
    #[inline]
    pub fn second_derivative(&self, r: f64) -> f64 {
        if self.ksw == 0.0 || r <= self.r1 || r >= self.rc {
            0.0
        } else {
            -6.0 * (self.r1 + self.rc - 2.0 * r) * self.ksw
        }
    }

    /// Third derivative, s'''(r)
    #[inline]
    pub fn third_derivative(&self, r: f64) -> f64 {
        if self.ksw == 0.0 || r <= self.r1 || r >= self.rc {
            0.0
        } else {
            12.0 * self.ksw
        }
    }

    /// All of s, s', s'', s''' in one call, as used by the table builder
    #[inline]
    pub fn derivatives(&self, r: f64) -> [f64; 4] {
        if self.ksw == 0.0 || r <= self.r1 {
            [1.0, 0.0, 0.0, 0.0]
        } else if r >= self.rc {
            [0.0, 0.0, 0.0, 0.0]
        } else {
            [
                self.value(r),
                self.derivative(r),
                self.second_derivative(r),
                self.third_derivative(r),
            ]
        }
    }
}

impl Cutoff for SwitchFunction {
    #[inline]
    fn cutoff(&self) -> f64 {
        self.rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_boundary_values() {
        let sw = SwitchFunction::new(0.9, 1.2);
        // Continuity at the switch-on radius
        assert_relative_eq!(sw.value(0.9), 1.0);
        assert_relative_eq!(sw.value(0.9 + 1e-9), 1.0, epsilon = 1e-7);
        assert_relative_eq!(sw.derivative(0.9 + 1e-9), 0.0, epsilon = 1e-7);
        // Value and slope vanish at the cutoff
        assert_relative_eq!(sw.value(1.2 - 1e-9), 0.0, epsilon = 1e-7);
        assert_relative_eq!(sw.derivative(1.2 - 1e-9), 0.0, epsilon = 1e-7);
        assert_eq!(sw.value(1.2), 0.0);
        assert_eq!(sw.value(1.5), 0.0);
    }

    #[test]
    fn test_derivatives_are_consistent() {
        let sw = SwitchFunction::new(0.9, 1.2);
        let h = 1e-6;
        for &r in &[0.95, 1.0, 1.1, 1.15] {
            let numeric = (sw.value(r + h) - sw.value(r - h)) / (2.0 * h);
            assert_relative_eq!(sw.derivative(r), numeric, epsilon = 1e-6);
            let numeric2 = (sw.derivative(r + h) - sw.derivative(r - h)) / (2.0 * h);
            assert_relative_eq!(sw.second_derivative(r), numeric2, epsilon = 1e-5);
            let numeric3 = (sw.second_derivative(r + h) - sw.second_derivative(r - h)) / (2.0 * h);
            assert_relative_eq!(sw.third_derivative(r), numeric3, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_degenerate_window_is_identity() {
        let sw = SwitchFunction::new(1.2, 1.2);
        assert!(sw.is_identity());
        for &r in &[0.1, 0.9, 1.1999, 1.2, 2.0] {
            assert_eq!(sw.value(r), 1.0);
            assert_eq!(sw.derivative(r), 0.0);
            assert_eq!(sw.derivatives(r), [1.0, 0.0, 0.0, 0.0]);
        }
    }
}
