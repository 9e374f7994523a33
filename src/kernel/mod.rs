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

//! ## Non-bonded force kernel
//!
//! The performance-critical inner loop: iterates a cluster pair list and
//! accumulates Lennard-Jones and Coulomb forces, energies, and per-shift
//! virial contributions. Interaction models are resolved once per run into
//! monomorphized inner loops, never branched per particle pair.
//!
//! Conventions shared with the rest of the crate:
//! - shift id 0 is the central (zero-shift) periodic image,
//! - forces are accumulated additively; callers zero the output between
//!   independent evaluations,
//! - the list is trusted: no validation happens on the hot path.

use crate::config::{CoulombModel, ForceField};
use crate::table::PairTable;
use crate::{erfc_x, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::ops::Range;
use wide::f64x4;

pub mod pairlist;
mod scalar;
mod simd;

pub use pairlist::{
    diagonal_exclusion_mask, exclusion_bit, AtomData, ClusterPairList, IClusterEntry,
    JClusterEntry, CLUSTER_SIZE, EXCL_ALL,
};

/// Added to squared distances on diagonal cluster pairs so the self lane
/// (zero separation, always excluded) stays finite through the reciprocal.
pub(crate) const AVOID_SINGULARITY_R2: f64 = 1.0e-12;

/// Optional outputs toggled per kernel invocation
#[derive(Clone, Copy, Debug)]
pub struct KernelFlags {
    /// Accumulate potential energies
    pub energies: bool,
    /// Accumulate per-shift force sums for the virial
    pub shift_forces: bool,
}

impl Default for KernelFlags {
    fn default() -> Self {
        Self {
            energies: true,
            shift_forces: true,
        }
    }
}

/// Energy sums split by energy-group pair.
///
/// With a single group this degenerates to one scalar per term. The matrix
/// is indexed by (i-group, j-group) as encountered; callers wanting a
/// symmetric view should sum the two off-diagonal entries.
#[derive(Clone, Debug)]
pub struct EnergyAccum {
    ngroups: usize,
    vdw: Vec<f64>,
    coulomb: Vec<f64>,
}

impl EnergyAccum {
    pub fn new(ngroups: usize) -> Self {
        Self {
            ngroups,
            vdw: vec![0.0; ngroups * ngroups],
            coulomb: vec![0.0; ngroups * ngroups],
        }
    }

    /// Number of energy groups
    pub fn ngroups(&self) -> usize {
        self.ngroups
    }

    /// Lennard-Jones energy for a group pair
    pub fn vdw(&self, gi: usize, gj: usize) -> f64 {
        self.vdw[gi * self.ngroups + gj]
    }

    /// Coulomb energy for a group pair
    pub fn coulomb(&self, gi: usize, gj: usize) -> f64 {
        self.coulomb[gi * self.ngroups + gj]
    }

    /// Total Lennard-Jones energy over all group pairs
    pub fn vdw_total(&self) -> f64 {
        self.vdw.iter().sum()
    }

    /// Total Coulomb energy over all group pairs
    pub fn coulomb_total(&self) -> f64 {
        self.coulomb.iter().sum()
    }

    #[inline]
    pub(crate) fn add_vdw(&mut self, gi: usize, gj: usize, energy: f64) {
        self.vdw[gi * self.ngroups + gj] += energy;
    }

    #[inline]
    pub(crate) fn add_coulomb(&mut self, gi: usize, gj: usize, energy: f64) {
        self.coulomb[gi * self.ngroups + gj] += energy;
    }

    fn merge(&mut self, other: &Self) {
        assert_eq!(self.ngroups, other.ngroups);
        for (a, b) in self.vdw.iter_mut().zip(&other.vdw) {
            *a += b;
        }
        for (a, b) in self.coulomb.iter_mut().zip(&other.coulomb) {
            *a += b;
        }
    }

    /// Reset all sums to zero
    pub fn reset(&mut self) {
        self.vdw.fill(0.0);
        self.coulomb.fill(0.0);
    }
}

/// Additive kernel outputs: per-particle forces, per-shift virial forces,
/// and energy sums.
///
/// The force array is sized to the padded particle count; entries beyond
/// [`AtomData::len`] belong to padding and stay zero.
#[derive(Clone, Debug)]
pub struct NbOutput {
    /// Per-particle forces (padded length)
    pub forces: Vec<Vector3>,
    /// Per-shift accumulated i-cluster forces, for the virial
    pub shift_forces: Vec<Vector3>,
    /// Energy sums
    pub energies: EnergyAccum,
}

impl NbOutput {
    /// Zeroed output buffers sized for a particle set and shift table
    pub fn new(atoms: &AtomData, n_shifts: usize) -> Self {
        Self {
            forces: vec![Vector3::zeros(); atoms.n_clusters() * CLUSTER_SIZE],
            shift_forces: vec![Vector3::zeros(); n_shifts],
            energies: EnergyAccum::new(atoms.ngroups()),
        }
    }

    /// Add another output buffer of identical shape element-wise
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.forces.len(), other.forces.len());
        assert_eq!(self.shift_forces.len(), other.shift_forces.len());
        for (a, b) in self.forces.iter_mut().zip(&other.forces) {
            *a += b;
        }
        for (a, b) in self.shift_forces.iter_mut().zip(&other.shift_forces) {
            *a += b;
        }
        self.energies.merge(&other.energies);
    }

    /// Zero all buffers in place
    pub fn reset(&mut self) {
        self.forces.fill(Vector3::zeros());
        self.shift_forces.fill(Vector3::zeros());
        self.energies.reset();
    }
}

/// Per-pair Coulomb interaction, evaluated for unit charges.
///
/// Returns `(potential, force / r)` so the caller scales by the charge
/// product and multiplies the force directly onto distance-vector
/// components. The SIMD path defaults to per-lane scalar evaluation, which
/// table lookups and erfc need anyway; closed forms override it.
pub(crate) trait CoulombKind: Sync {
    fn eval(&self, rsq: f64, rinv: f64) -> (f64, f64);

    #[inline]
    fn eval_simd(&self, rsq: f64x4, rinv: f64x4) -> (f64x4, f64x4) {
        let rsq: [f64; 4] = rsq.into();
        let rinv: [f64; 4] = rinv.into();
        let mut v = [0.0; 4];
        let mut f = [0.0; 4];
        for lane in 0..4 {
            (v[lane], f[lane]) = self.eval(rsq[lane], rinv[lane]);
        }
        (f64x4::from(v), f64x4::from(f))
    }
}

/// Reaction-field Coulomb; `k_rf = c_rf = 0` reduces to plain truncated 1/r
pub(crate) struct RfCoulomb {
    pub k_rf: f64,
    pub c_rf: f64,
}

impl CoulombKind for RfCoulomb {
    #[inline]
    fn eval(&self, rsq: f64, rinv: f64) -> (f64, f64) {
        let v = rinv + self.k_rf * rsq - self.c_rf;
        let f = rinv * rinv * rinv - 2.0 * self.k_rf;
        (v, f)
    }

    #[inline]
    fn eval_simd(&self, rsq: f64x4, rinv: f64x4) -> (f64x4, f64x4) {
        let k_rf = f64x4::splat(self.k_rf);
        let v = k_rf.mul_add(rsq, rinv) - f64x4::splat(self.c_rf);
        let f = rinv * rinv * rinv - f64x4::splat(2.0 * self.k_rf);
        (v, f)
    }
}

/// Real-space Ewald Coulomb, erfc(βr)/r
pub(crate) struct EwaldCoulomb {
    pub beta: f64,
}

impl CoulombKind for EwaldCoulomb {
    #[inline]
    fn eval(&self, rsq: f64, rinv: f64) -> (f64, f64) {
        let r = rsq * rinv;
        let v = erfc_x(self.beta * r) * rinv;
        let gaussian = 2.0 * self.beta / PI.sqrt() * (-self.beta * self.beta * rsq).exp();
        let f = (v + gaussian) * rinv * rinv;
        (v, f)
    }
}

/// Tabulated Coulomb column lookup
pub(crate) struct TabCoulomb<'a> {
    pub table: &'a PairTable,
}

impl CoulombKind for TabCoulomb<'_> {
    #[inline]
    fn eval(&self, rsq: f64, rinv: f64) -> (f64, f64) {
        self.table.coulomb_vf(rsq * rinv)
    }
}

/// Per-pair Lennard-Jones interaction given gathered (c6, c12).
///
/// Same `(potential, force / r)` convention as [`CoulombKind`].
pub(crate) trait VdwKind: Sync {
    fn eval(&self, c6: f64, c12: f64, rsq: f64, rinv: f64) -> (f64, f64);

    #[inline]
    fn eval_simd(&self, c6: f64x4, c12: f64x4, rsq: f64x4, rinv: f64x4) -> (f64x4, f64x4) {
        let c6: [f64; 4] = c6.into();
        let c12: [f64; 4] = c12.into();
        let rsq: [f64; 4] = rsq.into();
        let rinv: [f64; 4] = rinv.into();
        let mut v = [0.0; 4];
        let mut f = [0.0; 4];
        for lane in 0..4 {
            (v[lane], f[lane]) = self.eval(c6[lane], c12[lane], rsq[lane], rinv[lane]);
        }
        (f64x4::from(v), f64x4::from(f))
    }
}

/// Closed-form 12-6 Lennard-Jones with optional potential shift.
///
/// `sh6 = r꜀⁻⁶` subtracts the cutoff value from the potential; zero for
/// plain truncation.
pub(crate) struct PlainVdw {
    sh6: f64,
    sh12: f64,
}

impl PlainVdw {
    pub fn new(sh_invrc6: f64) -> Self {
        Self {
            sh6: sh_invrc6,
            sh12: sh_invrc6 * sh_invrc6,
        }
    }
}

impl VdwKind for PlainVdw {
    #[inline]
    fn eval(&self, c6: f64, c12: f64, _rsq: f64, rinv: f64) -> (f64, f64) {
        let rinvsq = rinv * rinv;
        let rinv6 = rinvsq * rinvsq * rinvsq;
        let rinv12 = rinv6 * rinv6;
        let v = c12 * (rinv12 - self.sh12) - c6 * (rinv6 - self.sh6);
        let f = (12.0 * c12 * rinv12 - 6.0 * c6 * rinv6) * rinvsq;
        (v, f)
    }

    #[inline]
    fn eval_simd(&self, c6: f64x4, c12: f64x4, _rsq: f64x4, rinv: f64x4) -> (f64x4, f64x4) {
        let rinvsq = rinv * rinv;
        let rinv6 = rinvsq * rinvsq * rinvsq;
        let rinv12 = rinv6 * rinv6;
        let v = c12 * (rinv12 - f64x4::splat(self.sh12)) - c6 * (rinv6 - f64x4::splat(self.sh6));
        let f = (f64x4::splat(12.0) * c12 * rinv12 - f64x4::splat(6.0) * c6 * rinv6) * rinvsq;
        (v, f)
    }
}

/// Tabulated Lennard-Jones: dispersion and repulsion columns scaled by the
/// pair's (c6, c12)
pub(crate) struct TabVdw<'a> {
    pub table: &'a PairTable,
}

impl VdwKind for TabVdw<'_> {
    #[inline]
    fn eval(&self, c6: f64, c12: f64, rsq: f64, rinv: f64) -> (f64, f64) {
        let r = rsq * rinv;
        let (v_disp, f_disp) = self.table.dispersion_vf(r);
        let (v_rep, f_rep) = self.table.repulsion_vf(r);
        (c6 * v_disp + c12 * v_rep, c6 * f_disp + c12 * f_rep)
    }
}

/// Everything an inner loop needs, bundled to keep signatures short
pub(crate) struct RunContext<'a> {
    pub field: &'a ForceField,
    pub atoms: &'a AtomData,
    pub list: &'a ClusterPairList,
    pub shifts: &'a [Vector3],
    pub flags: KernelFlags,
}

impl RunContext<'_> {
    /// Coulomb self-energy subtraction for one i-entry, applied when the
    /// entry is the central-image diagonal block and Coulomb is active.
    pub(crate) fn subtract_self_energy(&self, entry: &IClusterEntry, out: &mut NbOutput) {
        if !(self.flags.energies && entry.do_coul && entry.shift == 0) {
            return;
        }
        let diagonal_first = self
            .list
            .j_slice(entry)
            .first()
            .is_some_and(|j| j.cj == entry.ci);
        if !diagonal_first {
            return;
        }
        let v_self = self.field.coulomb_self_factor();
        if v_self == 0.0 {
            return;
        }
        let facel = self.field.prefactor();
        let i0 = entry.ci * CLUSTER_SIZE;
        for row in 0..CLUSTER_SIZE {
            let q = self.atoms.q[i0 + row];
            let g = self.atoms.group[i0 + row];
            out.energies.add_coulomb(g, g, -facel * q * q * v_self);
        }
    }
}

/// Cluster-pair force kernel bound to a validated force field
pub struct Kernel<'a> {
    field: &'a ForceField,
    flags: KernelFlags,
}

impl<'a> Kernel<'a> {
    pub fn new(field: &'a ForceField) -> Self {
        Self {
            field,
            flags: KernelFlags::default(),
        }
    }

    /// Override the default output flags
    pub fn with_flags(mut self, flags: KernelFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Evaluate the whole pair list with the SIMD inner loop
    pub fn execute(
        &self,
        atoms: &AtomData,
        list: &ClusterPairList,
        shifts: &[Vector3],
        out: &mut NbOutput,
    ) {
        self.run_range(atoms, list, shifts, 0..list.n_entries(), out, false);
    }

    /// Evaluate with the scalar reference loop; bit-for-bit the same model
    /// semantics as [`Kernel::execute`], used for validation
    pub fn execute_scalar(
        &self,
        atoms: &AtomData,
        list: &ClusterPairList,
        shifts: &[Vector3],
        out: &mut NbOutput,
    ) {
        self.run_range(atoms, list, shifts, 0..list.n_entries(), out, true);
    }

    /// Evaluate in parallel over disjoint i-entry chunks.
    ///
    /// Each worker folds into a private output buffer; buffers are reduced
    /// by summation afterwards, so no synchronization happens inside the
    /// loop body and j-cluster reaction forces never race.
    pub fn execute_parallel(
        &self,
        atoms: &AtomData,
        list: &ClusterPairList,
        shifts: &[Vector3],
        out: &mut NbOutput,
    ) {
        let n = list.n_entries();
        if n == 0 {
            return;
        }
        let n_chunks = rayon::current_num_threads().clamp(1, n);
        let chunk = n.div_ceil(n_chunks);
        let partial = (0..n_chunks)
            .into_par_iter()
            .map(|c| {
                let range = c * chunk..((c + 1) * chunk).min(n);
                let mut local = NbOutput::new(atoms, shifts.len());
                self.run_range(atoms, list, shifts, range, &mut local, false);
                local
            })
            .reduce_with(|mut a, b| {
                a.merge(&b);
                a
            });
        if let Some(partial) = partial {
            out.merge(&partial);
        }
    }

    /// Resolve interaction models into concrete strategies, then run.
    ///
    /// Table presence for tabulated models is guaranteed by
    /// [`ForceField::new`]; the fallbacks here only keep dispatch total.
    fn run_range(
        &self,
        atoms: &AtomData,
        list: &ClusterPairList,
        shifts: &[Vector3],
        range: Range<usize>,
        out: &mut NbOutput,
        scalar_path: bool,
    ) {
        let ctx = RunContext {
            field: self.field,
            atoms,
            list,
            shifts,
            flags: self.flags,
        };
        match (self.field.coulomb_is_tabulated(), self.field.table()) {
            (true, Some(table)) => {
                dispatch_vdw(&TabCoulomb { table }, &ctx, range, out, scalar_path)
            }
            _ => match self.field.coulomb_model() {
                CoulombModel::Ewald { beta } => {
                    dispatch_vdw(&EwaldCoulomb { beta }, &ctx, range, out, scalar_path)
                }
                _ => {
                    let (k_rf, c_rf) = self.field.reaction_field();
                    dispatch_vdw(&RfCoulomb { k_rf, c_rf }, &ctx, range, out, scalar_path)
                }
            },
        }
    }
}

fn dispatch_vdw<C: CoulombKind>(
    coulomb: &C,
    ctx: &RunContext,
    range: Range<usize>,
    out: &mut NbOutput,
    scalar_path: bool,
) {
    match (ctx.field.vdw_is_tabulated(), ctx.field.table()) {
        (true, Some(table)) => run_both(coulomb, &TabVdw { table }, ctx, range, out, scalar_path),
        _ => run_both(
            coulomb,
            &PlainVdw::new(ctx.field.vdw_shift()),
            ctx,
            range,
            out,
            scalar_path,
        ),
    }
}

fn run_both<C: CoulombKind, V: VdwKind>(
    coulomb: &C,
    vdw: &V,
    ctx: &RunContext,
    range: Range<usize>,
    out: &mut NbOutput,
    scalar_path: bool,
) {
    if scalar_path {
        scalar::run_list(coulomb, vdw, ctx, range, out);
    } else {
        simd::run_list(coulomb, vdw, ctx, range, out);
    }
}

#[cfg(test)]
mod tests;
