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

//! SIMD cluster inner loop.
//!
//! Each i-cluster row is broadcast against the four j-lanes of a j-cluster,
//! so one `f64x4` operation handles four particle pairs. Per j-cluster the
//! loop runs in one of two forms chosen by the exclusion mask: a masked form
//! that folds the per-lane exclusion bits into the interaction mask, and an
//! unmasked fast path once all partially-excluded j-clusters (ordered first
//! in the list) are done. Excluded and beyond-cutoff lanes are zeroed
//! multiplicatively; the reciprocal distance itself carries the mask so all
//! downstream force terms vanish on dead lanes.

use super::pairlist::{JClusterEntry, CLUSTER_SIZE, EXCL_ALL};
use super::{CoulombKind, NbOutput, RunContext, VdwKind, AVOID_SINGULARITY_R2};
use crate::{Cutoff, Vector3};
use std::ops::Range;
use wide::{f64x4, CmpLt};

#[inline]
fn load4(values: &[f64], at: usize) -> f64x4 {
    f64x4::from([values[at], values[at + 1], values[at + 2], values[at + 3]])
}

#[inline]
fn hsum(v: f64x4) -> f64 {
    let v: [f64; 4] = v.into();
    v[0] + v[1] + v[2] + v[3]
}

/// Per-lane reciprocal square root; lanes are independent scalars so the
/// hardware sqrt stays exact.
#[inline]
fn rsqrt(rsq: f64x4) -> f64x4 {
    let rsq: [f64; 4] = rsq.into();
    f64x4::from([
        1.0 / rsq[0].sqrt(),
        1.0 / rsq[1].sqrt(),
        1.0 / rsq[2].sqrt(),
        1.0 / rsq[3].sqrt(),
    ])
}

/// 0/1 lane mask from four exclusion bits
#[inline]
fn exclusion_lanes(excl: u16, row: usize) -> f64x4 {
    let bits = excl >> (row * CLUSTER_SIZE);
    f64x4::from([
        (bits & 1) as f64,
        (bits >> 1 & 1) as f64,
        (bits >> 2 & 1) as f64,
        (bits >> 3 & 1) as f64,
    ])
}

pub(crate) fn run_list<C: CoulombKind, V: VdwKind>(
    coulomb: &C,
    vdw: &V,
    ctx: &RunContext,
    range: Range<usize>,
    out: &mut NbOutput,
) {
    let atoms = ctx.atoms;
    let facel = ctx.field.prefactor();
    let rc2 = f64x4::splat(ctx.field.cutoff_squared());
    let lj = ctx.field.lj();
    let ngroups = out.energies.ngroups();
    let one = f64x4::ONE;
    let zero = f64x4::ZERO;

    for entry in &ctx.list.i_entries[range] {
        let shift = ctx.shifts[entry.shift];
        let lj_rows = entry.lj_rows();
        let i0 = entry.ci * CLUSTER_SIZE;
        ctx.subtract_self_energy(entry, out);

        // Broadcast shifted i-row positions, scaled charges, and metadata
        let mut xi = [zero; CLUSTER_SIZE];
        let mut yi = [zero; CLUSTER_SIZE];
        let mut zi = [zero; CLUSTER_SIZE];
        let mut qi = [zero; CLUSTER_SIZE];
        let mut ti = [0usize; CLUSTER_SIZE];
        let mut gi = [0usize; CLUSTER_SIZE];
        for row in 0..CLUSTER_SIZE {
            xi[row] = f64x4::splat(atoms.x[i0 + row] + shift.x);
            yi[row] = f64x4::splat(atoms.y[i0 + row] + shift.y);
            zi[row] = f64x4::splat(atoms.z[i0 + row] + shift.z);
            qi[row] = f64x4::splat(facel * atoms.q[i0 + row]);
            ti[row] = atoms.typ[i0 + row];
            gi[row] = atoms.group[i0 + row];
        }

        let mut fix = [zero; CLUSTER_SIZE];
        let mut fiy = [zero; CLUSTER_SIZE];
        let mut fiz = [zero; CLUSTER_SIZE];
        let mut vctot = zero;
        let mut vvtot = zero;

        let js = ctx.list.j_slice(entry);
        let split = js
            .iter()
            .position(|j| j.excl == EXCL_ALL)
            .unwrap_or(js.len());
        let (masked_js, plain_js) = js.split_at(split);

        let mut pair_body = |jent: &JClusterEntry, masked: bool| {
            let j0 = jent.cj * CLUSTER_SIZE;
            let diagonal = jent.cj == entry.ci;
            let xj = load4(&atoms.x, j0);
            let yj = load4(&atoms.y, j0);
            let zj = load4(&atoms.z, j0);
            let qj = load4(&atoms.q, j0);

            let mut fjx = zero;
            let mut fjy = zero;
            let mut fjz = zero;

            for row in 0..CLUSTER_SIZE {
                let dx = xi[row] - xj;
                let dy = yi[row] - yj;
                let dz = zi[row] - zj;
                let mut rsq = dx.mul_add(dx, dy.mul_add(dy, dz * dz));
                if diagonal {
                    rsq += f64x4::splat(AVOID_SINGULARITY_R2);
                }
                let mut mask = rsq.cmp_lt(rc2).blend(one, zero);
                if masked {
                    mask *= exclusion_lanes(jent.excl, row);
                }
                let rinv = mask * rsqrt(rsq);

                let mut fscal = zero;
                let mut vc = zero;
                let mut vv = zero;
                if entry.do_coul {
                    let qq = qi[row] * qj;
                    let (v, f) = coulomb.eval_simd(rsq, rinv);
                    fscal = qq * f * mask;
                    vc = qq * v * mask;
                }
                if row < lj_rows {
                    let tj = &atoms.typ[j0..j0 + CLUSTER_SIZE];
                    let mut c6 = [0.0; CLUSTER_SIZE];
                    let mut c12 = [0.0; CLUSTER_SIZE];
                    for lane in 0..CLUSTER_SIZE {
                        (c6[lane], c12[lane]) = lj.pair(ti[row], tj[lane]);
                    }
                    let (v, f) = vdw.eval_simd(f64x4::from(c6), f64x4::from(c12), rsq, rinv);
                    fscal += f * mask;
                    vv = v * mask;
                }

                let fx = fscal * dx;
                let fy = fscal * dy;
                let fz = fscal * dz;
                fix[row] += fx;
                fiy[row] += fy;
                fiz[row] += fz;
                fjx += fx;
                fjy += fy;
                fjz += fz;

                if ctx.flags.energies {
                    if ngroups == 1 {
                        vctot += vc;
                        vvtot += vv;
                    } else {
                        let vc: [f64; 4] = vc.into();
                        let vv: [f64; 4] = vv.into();
                        for lane in 0..CLUSTER_SIZE {
                            let gj = atoms.group[j0 + lane];
                            out.energies.add_coulomb(gi[row], gj, vc[lane]);
                            out.energies.add_vdw(gi[row], gj, vv[lane]);
                        }
                    }
                }
            }

            // Newton's third law: store accumulated reaction forces back
            let fjx: [f64; 4] = fjx.into();
            let fjy: [f64; 4] = fjy.into();
            let fjz: [f64; 4] = fjz.into();
            for lane in 0..CLUSTER_SIZE {
                out.forces[j0 + lane] -= Vector3::new(fjx[lane], fjy[lane], fjz[lane]);
            }
        };

        for jent in masked_js {
            pair_body(jent, true);
        }
        for jent in plain_js {
            pair_body(jent, false);
        }

        // Horizontal reduction of the i-row accumulators
        let mut f_entry = Vector3::zeros();
        for row in 0..CLUSTER_SIZE {
            let f = Vector3::new(hsum(fix[row]), hsum(fiy[row]), hsum(fiz[row]));
            out.forces[i0 + row] += f;
            f_entry += f;
        }
        if ctx.flags.shift_forces {
            out.shift_forces[entry.shift] += f_entry;
        }
        if ctx.flags.energies && ngroups == 1 {
            out.energies.add_coulomb(0, 0, hsum(vctot));
            out.energies.add_vdw(0, 0, hsum(vvtot));
        }
    }
}
