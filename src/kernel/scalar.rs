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

//! Scalar reference inner loop.
//!
//! One particle pair at a time, no lane masking tricks: exclusion bits are
//! tested directly and the cutoff is an early continue. Kept deliberately
//! simple so the SIMD loop can be validated against it.

use super::pairlist::{exclusion_bit, CLUSTER_SIZE};
use super::{CoulombKind, NbOutput, RunContext, VdwKind, AVOID_SINGULARITY_R2};
use crate::{Cutoff, Vector3};
use std::ops::Range;

pub(crate) fn run_list<C: CoulombKind, V: VdwKind>(
    coulomb: &C,
    vdw: &V,
    ctx: &RunContext,
    range: Range<usize>,
    out: &mut NbOutput,
) {
    let atoms = ctx.atoms;
    let facel = ctx.field.prefactor();
    let rc2 = ctx.field.cutoff_squared();
    let lj = ctx.field.lj();

    for entry in &ctx.list.i_entries[range] {
        let shift = ctx.shifts[entry.shift];
        let lj_rows = entry.lj_rows();
        let i0 = entry.ci * CLUSTER_SIZE;
        ctx.subtract_self_energy(entry, out);

        let mut fi = [Vector3::zeros(); CLUSTER_SIZE];
        for jent in ctx.list.j_slice(entry) {
            let j0 = jent.cj * CLUSTER_SIZE;
            let diagonal = jent.cj == entry.ci;

            for row in 0..CLUSTER_SIZE {
                let xi = atoms.x[i0 + row] + shift.x;
                let yi = atoms.y[i0 + row] + shift.y;
                let zi = atoms.z[i0 + row] + shift.z;
                let qi = facel * atoms.q[i0 + row];
                let ti = atoms.typ[i0 + row];
                let gi = atoms.group[i0 + row];

                for lane in 0..CLUSTER_SIZE {
                    if jent.excl & exclusion_bit(row, lane) == 0 {
                        continue;
                    }
                    let dx = xi - atoms.x[j0 + lane];
                    let dy = yi - atoms.y[j0 + lane];
                    let dz = zi - atoms.z[j0 + lane];
                    let mut rsq = dx * dx + dy * dy + dz * dz;
                    if diagonal {
                        rsq += AVOID_SINGULARITY_R2;
                    }
                    if rsq >= rc2 {
                        continue;
                    }
                    let rinv = 1.0 / rsq.sqrt();
                    let gj = atoms.group[j0 + lane];

                    let mut fscal = 0.0;
                    if entry.do_coul {
                        let qq = qi * atoms.q[j0 + lane];
                        let (vc, fc) = coulomb.eval(rsq, rinv);
                        fscal += qq * fc;
                        if ctx.flags.energies {
                            out.energies.add_coulomb(gi, gj, qq * vc);
                        }
                    }
                    if row < lj_rows {
                        let (c6, c12) = lj.pair(ti, atoms.typ[j0 + lane]);
                        let (vv, fv) = vdw.eval(c6, c12, rsq, rinv);
                        fscal += fv;
                        if ctx.flags.energies {
                            out.energies.add_vdw(gi, gj, vv);
                        }
                    }

                    let force = Vector3::new(fscal * dx, fscal * dy, fscal * dz);
                    fi[row] += force;
                    out.forces[j0 + lane] -= force;
                }
            }
        }

        let mut f_entry = Vector3::zeros();
        for row in 0..CLUSTER_SIZE {
            out.forces[i0 + row] += fi[row];
            f_entry += fi[row];
        }
        if ctx.flags.shift_forces {
            out.shift_forces[entry.shift] += f_entry;
        }
    }
}
