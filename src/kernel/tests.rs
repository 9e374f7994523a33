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

use super::*;
use crate::config::{
    CombinationRule, CoulombModel, ForceField, LjParameters, NonbondedConfig, VdwModel,
};
use approx::assert_relative_eq;

const RC: f64 = 1.5;

fn field(coulomb: CoulombModel, vdw: VdwModel, lj: LjParameters) -> ForceField {
    ForceField::new(NonbondedConfig::new(coulomb, vdw, RC, lj).with_prefactor(1.0)).unwrap()
}

fn no_lj() -> LjParameters {
    LjParameters::PairMatrix {
        ntypes: 1,
        c6: vec![0.0],
        c12: vec![0.0],
    }
}

/// Two particles on the x axis in a single diagonal cluster pair
fn two_particles(r: f64, charges: (f64, f64)) -> (AtomData, ClusterPairList) {
    let positions = [Vector3::zeros(), Vector3::new(r, 0.0, 0.0)];
    let atoms = AtomData::new(&positions, &[charges.0, charges.1], &[0, 0]);
    let mut list = ClusterPairList::new();
    list.push_entry(
        0,
        0,
        true,
        true,
        false,
        [JClusterEntry {
            cj: 0,
            excl: EXCL_ALL,
        }],
    );
    (atoms, list)
}

/// Eight particles in two clusters with partial exclusions and mixed types
fn mixed_system() -> (AtomData, ClusterPairList) {
    let positions: Vec<Vector3> = (0..8)
        .map(|i| {
            let t = i as f64;
            Vector3::new(0.37 * t, 0.21 * (t * 1.3).sin(), 0.15 * (t * 0.7).cos())
        })
        .collect();
    let charges: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    let types: Vec<usize> = (0..8).map(|i| i % 2).collect();
    let atoms = AtomData::new(&positions, &charges, &types);
    let mut list = ClusterPairList::new();
    list.push_entry(
        0,
        0,
        true,
        true,
        false,
        [
            JClusterEntry {
                cj: 0,
                excl: EXCL_ALL,
            },
            // Bonded exclusion between atoms 3 and 4
            JClusterEntry {
                cj: 1,
                excl: EXCL_ALL & !exclusion_bit(3, 0),
            },
        ],
    );
    list.push_entry(
        1,
        0,
        true,
        true,
        false,
        [JClusterEntry {
            cj: 1,
            excl: EXCL_ALL,
        }],
    );
    (atoms, list)
}

fn mixed_field() -> ForceField {
    field(
        CoulombModel::ReactionField { epsilon_rf: 78.0 },
        VdwModel::PotentialShift,
        LjParameters::PerType {
            epsilons: vec![0.65, 0.2],
            sigmas: vec![0.31, 0.45],
            rule: CombinationRule::LorentzBerthelot,
        },
    )
}

#[test]
fn test_plain_coulomb_two_particles() {
    let field = field(CoulombModel::Cutoff, VdwModel::Cutoff, no_lj());
    let (atoms, list) = two_particles(1.0, (1.0, 1.0));
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    // Unit charges at r = 1 with facel = 1: energy 1, force magnitude 1
    assert_relative_eq!(out.energies.coulomb_total(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(out.forces[0].x, -1.0, epsilon = 1e-9);
    assert_relative_eq!(out.forces[1].x, 1.0, epsilon = 1e-9);
    assert_relative_eq!(out.forces[0].y, 0.0);
    // Action equals reaction
    assert_relative_eq!((out.forces[0] + out.forces[1]).norm(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_lennard_jones_two_particles() {
    // ε = σ = 1 so c6 = c12 = 4
    let field = field(
        CoulombModel::Cutoff,
        VdwModel::Cutoff,
        LjParameters::PairMatrix {
            ntypes: 1,
            c6: vec![4.0],
            c12: vec![4.0],
        },
    );
    let (atoms, list) = two_particles(1.0, (0.0, 0.0));
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    // At r = σ the potential crosses zero and the force is 24ε/σ
    assert_relative_eq!(out.energies.vdw_total(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(out.forces[0].x, -24.0, epsilon = 1e-6);

    // At the potential minimum r = 2^(1/6) σ the force vanishes
    let (mut atoms, list) = two_particles(1.0, (0.0, 0.0));
    atoms.set_positions(&[
        Vector3::zeros(),
        Vector3::new(2.0_f64.powf(1.0 / 6.0), 0.0, 0.0),
    ]);
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);
    assert_relative_eq!(out.forces[0].x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(out.energies.vdw_total(), -1.0, epsilon = 1e-9);
}

#[test]
fn test_excluded_pairs_contribute_nothing() {
    let field = field(CoulombModel::Cutoff, VdwModel::Cutoff, no_lj());
    let positions = [Vector3::zeros(), Vector3::new(0.2, 0.0, 0.0)];
    let atoms = AtomData::new(&positions, &[1.0, 1.0], &[0, 0]);
    let mut list = ClusterPairList::new();
    // All pairs excluded, arbitrarily short distance
    list.push_entry(
        0,
        0,
        true,
        true,
        false,
        [JClusterEntry { cj: 0, excl: 0 }],
    );
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    assert_eq!(out.energies.coulomb_total(), 0.0);
    assert_eq!(out.energies.vdw_total(), 0.0);
    assert!(out.forces.iter().all(|f| f.norm() == 0.0));
}

#[test]
fn test_reaction_field_energy_vanishes_at_cutoff() {
    let field = field(
        CoulombModel::ReactionField { epsilon_rf: 0.0 },
        VdwModel::Cutoff,
        no_lj(),
    );
    let (atoms, list) = two_particles(RC - 1e-4, (1.0, 1.0));
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field)
        .with_flags(KernelFlags {
            energies: true,
            shift_forces: false,
        })
        .execute(&atoms, &list, &shifts, &mut out);

    // c_rf cancels the potential at r = rc; subtract the per-particle
    // self-energy terms to isolate the pair contribution
    let self_energy = -2.0 * field.coulomb_self_factor();
    assert_relative_eq!(
        out.energies.coulomb_total() - self_energy,
        0.0,
        epsilon = 1e-3
    );
}

#[test]
fn test_self_energy_subtraction() {
    // A single charge: no pair terms, only the self-energy subtraction
    let positions = [Vector3::zeros()];
    let atoms = AtomData::new(&positions, &[2.0], &[0]);
    let mut list = ClusterPairList::new();
    list.push_entry(
        0,
        0,
        false,
        true,
        false,
        [JClusterEntry {
            cj: 0,
            excl: EXCL_ALL,
        }],
    );
    let shifts = [Vector3::zeros()];

    let rf = field(
        CoulombModel::ReactionField { epsilon_rf: 0.0 },
        VdwModel::Cutoff,
        no_lj(),
    );
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&rf).execute(&atoms, &list, &shifts, &mut out);
    let (_, c_rf) = rf.reaction_field();
    assert_relative_eq!(
        out.energies.coulomb_total(),
        -4.0 * 0.5 * c_rf,
        epsilon = 1e-12
    );
    assert!(out.forces.iter().all(|f| f.norm() == 0.0));

    let ewald = field(CoulombModel::Ewald { beta: 3.0 }, VdwModel::Cutoff, no_lj());
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&ewald).execute(&atoms, &list, &shifts, &mut out);
    assert_relative_eq!(
        out.energies.coulomb_total(),
        -4.0 * 3.0 / PI.sqrt(),
        epsilon = 1e-12
    );
}

#[test]
fn test_ewald_two_particles() {
    let beta = 2.8;
    let field = field(CoulombModel::Ewald { beta }, VdwModel::Cutoff, no_lj());
    let r = 0.6;
    let (atoms, list) = two_particles(r, (1.0, -1.0));
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    // Pair term minus the per-particle self-energies
    let expected = -erfc_x(beta * r) / r - 2.0 * beta / PI.sqrt();
    assert_relative_eq!(out.energies.coulomb_total(), expected, epsilon = 1e-9);
    // Opposite charges attract
    assert!(out.forces[0].x > 0.0);
}

#[test]
fn test_switched_coulomb_matches_bare_potential_below_r1() {
    let field = ForceField::new(
        NonbondedConfig::new(CoulombModel::Switched, VdwModel::Cutoff, RC, no_lj())
            .with_prefactor(1.0)
            .with_switch_radius(0.9),
    )
    .unwrap();
    let (atoms, list) = two_particles(0.7, (1.0, 1.0));
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);
    assert_relative_eq!(out.energies.coulomb_total(), 1.0 / 0.7, epsilon = 1e-6);

    // Beyond the cutoff the switched table gives exactly nothing
    let (atoms, list) = two_particles(RC + 0.05, (1.0, 1.0));
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);
    assert_eq!(out.energies.coulomb_total(), 0.0);
}

#[test]
fn test_simd_matches_scalar_reference() {
    let field = mixed_field();
    let (atoms, list) = mixed_system();
    let shifts = [Vector3::zeros()];
    let kernel = Kernel::new(&field);

    let mut simd_out = NbOutput::new(&atoms, 1);
    kernel.execute(&atoms, &list, &shifts, &mut simd_out);
    let mut scalar_out = NbOutput::new(&atoms, 1);
    kernel.execute_scalar(&atoms, &list, &shifts, &mut scalar_out);

    for (a, b) in simd_out.forces.iter().zip(&scalar_out.forces) {
        for axis in 0..3 {
            assert_relative_eq!(a[axis], b[axis], epsilon = 1e-9, max_relative = 1e-6);
        }
    }
    assert_relative_eq!(
        simd_out.energies.coulomb_total(),
        scalar_out.energies.coulomb_total(),
        max_relative = 1e-9
    );
    assert_relative_eq!(
        simd_out.energies.vdw_total(),
        scalar_out.energies.vdw_total(),
        max_relative = 1e-9
    );
    assert_relative_eq!(
        simd_out.shift_forces[0].x,
        scalar_out.shift_forces[0].x,
        epsilon = 1e-9,
        max_relative = 1e-6
    );
}

#[test]
fn test_tabulated_models_match_scalar_reference() {
    let field = ForceField::new(
        NonbondedConfig::new(
            CoulombModel::Shifted,
            VdwModel::Switched,
            RC,
            LjParameters::PairMatrix {
                ntypes: 2,
                c6: vec![1e-3, 2e-3, 2e-3, 4e-3],
                c12: vec![1e-6, 2e-6, 2e-6, 4e-6],
            },
        )
        .with_prefactor(1.0)
        .with_switch_radius(1.0),
    )
    .unwrap();
    let (atoms, list) = mixed_system();
    let shifts = [Vector3::zeros()];
    let kernel = Kernel::new(&field);

    let mut simd_out = NbOutput::new(&atoms, 1);
    kernel.execute(&atoms, &list, &shifts, &mut simd_out);
    let mut scalar_out = NbOutput::new(&atoms, 1);
    kernel.execute_scalar(&atoms, &list, &shifts, &mut scalar_out);

    for (a, b) in simd_out.forces.iter().zip(&scalar_out.forces) {
        for axis in 0..3 {
            assert_relative_eq!(a[axis], b[axis], epsilon = 1e-9, max_relative = 1e-6);
        }
    }
}

#[test]
fn test_parallel_matches_serial() {
    let field = mixed_field();
    let (atoms, list) = mixed_system();
    let shifts = [Vector3::zeros()];
    let kernel = Kernel::new(&field);

    let mut serial = NbOutput::new(&atoms, 1);
    kernel.execute(&atoms, &list, &shifts, &mut serial);
    let mut parallel = NbOutput::new(&atoms, 1);
    kernel.execute_parallel(&atoms, &list, &shifts, &mut parallel);

    for (a, b) in serial.forces.iter().zip(&parallel.forces) {
        for axis in 0..3 {
            assert_relative_eq!(a[axis], b[axis], epsilon = 1e-12, max_relative = 1e-9);
        }
    }
    assert_relative_eq!(
        serial.energies.coulomb_total(),
        parallel.energies.coulomb_total(),
        max_relative = 1e-12
    );
}

#[test]
fn test_idempotence() {
    let field = mixed_field();
    let (atoms, list) = mixed_system();
    let shifts = [Vector3::zeros()];
    let kernel = Kernel::new(&field);

    let mut first = NbOutput::new(&atoms, 1);
    kernel.execute(&atoms, &list, &shifts, &mut first);
    let mut second = NbOutput::new(&atoms, 1);
    kernel.execute(&atoms, &list, &shifts, &mut second);

    // Identical inputs and fresh accumulators give bit-identical results
    for (a, b) in first.forces.iter().zip(&second.forces) {
        assert_eq!(a, b);
    }
    assert_eq!(
        first.energies.coulomb_total(),
        second.energies.coulomb_total()
    );
    assert_eq!(first.energies.vdw_total(), second.energies.vdw_total());
}

#[test]
fn test_periodic_shift_and_virial_accumulation() {
    let field = ForceField::new(
        NonbondedConfig::new(CoulombModel::Cutoff, VdwModel::Cutoff, 0.2, no_lj())
            .with_prefactor(1.0),
    )
    .unwrap();
    // Atom 0 near the left box face, atom 4 near the right; they only
    // interact through the periodic image shifted by the box length
    let mut positions = vec![Vector3::new(0.05, 0.0, 0.0)];
    positions.extend((1..4).map(|i| Vector3::new(0.05, 10.0 * i as f64, 0.0)));
    positions.push(Vector3::new(2.95, 0.0, 0.0));
    positions.extend((1..4).map(|i| Vector3::new(2.95, 50.0 + 10.0 * i as f64, 0.0)));
    let atoms = AtomData::new(&positions, &[1.0; 8], &[0; 8]);
    let mut list = ClusterPairList::new();
    list.push_entry(
        0,
        1,
        false,
        true,
        false,
        [JClusterEntry {
            cj: 1,
            excl: EXCL_ALL,
        }],
    );
    let shifts = [Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)];
    let mut out = NbOutput::new(&atoms, shifts.len());
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    // Image separation 0.1: energy 10, force magnitude 100 along +x on atom 0
    assert_relative_eq!(out.energies.coulomb_total(), 10.0, epsilon = 1e-9);
    assert_relative_eq!(out.forces[0].x, 100.0, epsilon = 1e-6);
    assert_relative_eq!(out.forces[4].x, -100.0, epsilon = 1e-6);
    // The i-cluster force sum lands on the shift used by the entry
    assert_relative_eq!(out.shift_forces[1].x, 100.0, epsilon = 1e-6);
    assert_eq!(out.shift_forces[0].x, 0.0);
}

#[test]
fn test_energy_groups() {
    let field = field(CoulombModel::Cutoff, VdwModel::Cutoff, no_lj());
    let positions = [Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)];
    let atoms = AtomData::with_groups(&positions, &[1.0, 1.0], &[0, 0], &[0, 1]);
    let mut list = ClusterPairList::new();
    list.push_entry(
        0,
        0,
        false,
        true,
        false,
        [JClusterEntry {
            cj: 0,
            excl: EXCL_ALL,
        }],
    );
    let shifts = [Vector3::zeros()];
    let mut out = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut out);

    // The pair lands in the (0, 1) group slot and nowhere else
    assert_relative_eq!(out.energies.coulomb(0, 1), 1.0, epsilon = 1e-12);
    assert_eq!(out.energies.coulomb(0, 0), 0.0);
    assert_eq!(out.energies.coulomb(1, 1), 0.0);
    assert_relative_eq!(out.energies.coulomb_total(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_flags_disable_outputs() {
    let field = mixed_field();
    let (atoms, list) = mixed_system();
    let shifts = [Vector3::zeros()];

    let mut quiet = NbOutput::new(&atoms, 1);
    Kernel::new(&field)
        .with_flags(KernelFlags {
            energies: false,
            shift_forces: false,
        })
        .execute(&atoms, &list, &shifts, &mut quiet);
    assert_eq!(quiet.energies.coulomb_total(), 0.0);
    assert_eq!(quiet.energies.vdw_total(), 0.0);
    assert!(quiet.shift_forces.iter().all(|f| f.norm() == 0.0));

    // Forces are unaffected by the flags
    let mut full = NbOutput::new(&atoms, 1);
    Kernel::new(&field).execute(&atoms, &list, &shifts, &mut full);
    for (a, b) in quiet.forces.iter().zip(&full.forces) {
        assert_eq!(a, b);
    }
}
