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

//! ## Cluster pair lists and particle data
//!
//! Particles are grouped into fixed-size clusters of [`CLUSTER_SIZE`]; the
//! pair list pairs an i-cluster against a range of j-clusters, each carrying
//! a per-pair exclusion bitmask. Lists are produced by an external neighbor
//! search and consumed read-only by the kernel; the kernel performs no
//! validation on them.

use crate::Vector3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Particles per cluster; one SIMD register row
pub const CLUSTER_SIZE: usize = 4;

/// All-interacting exclusion mask; sentinel selecting the unmasked fast path
pub const EXCL_ALL: u16 = 0xffff;

/// Exclusion mask for a diagonal (self) cluster pair: only lanes with
/// `j > i` interact, so each particle pair is counted once and self pairs
/// never enter the pair sum. List builders AND this into the bonded
/// exclusion mask whenever `cj == ci`.
pub const fn diagonal_exclusion_mask() -> u16 {
    let mut mask = 0u16;
    let mut i = 0;
    while i < CLUSTER_SIZE {
        let mut j = i + 1;
        while j < CLUSTER_SIZE {
            mask |= 1 << (i * CLUSTER_SIZE + j);
            j += 1;
        }
        i += 1;
    }
    mask
}

/// Bit index of pair (i-row, j-lane) in an exclusion mask
#[inline]
pub const fn exclusion_bit(i: usize, j: usize) -> u16 {
    1 << (i * CLUSTER_SIZE + j)
}

/// One j-cluster reference with its exclusion mask.
///
/// Mask semantics: bit `i·4+j` set means i-row `i` interacts with j-lane
/// `j`; [`EXCL_ALL`] routes the pair through the unmasked fast path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct JClusterEntry {
    /// j-cluster index
    pub cj: usize,
    /// Exclusion bitmask, 1 = interacting
    pub excl: u16,
}

/// One i-cluster entry: interaction flags, periodic shift, and its j-range
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct IClusterEntry {
    /// i-cluster index
    pub ci: usize,
    /// Periodic shift-vector id; id 0 is the central (zero-shift) image
    pub shift: usize,
    /// Any i-row carries Lennard-Jones parameters
    pub do_lj: bool,
    /// Any i-row carries charge
    pub do_coul: bool,
    /// Only the first half of the i-rows needs Lennard-Jones
    pub half_lj: bool,
    pub(crate) cj_range: Range<usize>,
}

impl IClusterEntry {
    /// Number of leading i-rows that evaluate Lennard-Jones.
    ///
    /// Classification happens once per entry, never per particle pair, so
    /// SIMD lanes stay coherent through the inner loop.
    #[inline]
    pub fn lj_rows(&self) -> usize {
        match (self.do_lj, self.half_lj) {
            (false, _) => 0,
            (true, true) => CLUSTER_SIZE / 2,
            (true, false) => CLUSTER_SIZE,
        }
    }
}

/// Cluster pair list: i-entries pointing into a flat j-entry array.
///
/// Within each i-entry the j-entries are ordered masked-first, so the kernel
/// runs the exclusion-checking loop while masks are partial and switches to
/// the unmasked fast path for the remainder.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ClusterPairList {
    pub(crate) i_entries: Vec<IClusterEntry>,
    pub(crate) j_entries: Vec<JClusterEntry>,
}

impl ClusterPairList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one i-cluster entry with its j-clusters.
    ///
    /// Diagonal j-entries (`cj == ci`) get the [`diagonal_exclusion_mask`]
    /// folded in, and the j-entries are reordered masked-first.
    pub fn push_entry(
        &mut self,
        ci: usize,
        shift: usize,
        do_lj: bool,
        do_coul: bool,
        half_lj: bool,
        j_entries: impl IntoIterator<Item = JClusterEntry>,
    ) {
        let start = self.j_entries.len();
        let mut pending: Vec<JClusterEntry> = j_entries
            .into_iter()
            .map(|mut entry| {
                if entry.cj == ci {
                    entry.excl &= diagonal_exclusion_mask();
                }
                entry
            })
            .collect();
        pending.sort_by_key(|entry| entry.excl == EXCL_ALL);
        self.j_entries.extend(pending);
        self.i_entries.push(IClusterEntry {
            ci,
            shift,
            do_lj,
            do_coul,
            half_lj,
            cj_range: start..self.j_entries.len(),
        });
    }

    /// Number of i-cluster entries
    pub fn n_entries(&self) -> usize {
        self.i_entries.len()
    }

    /// True if the list holds no i-cluster entries
    pub fn is_empty(&self) -> bool {
        self.i_entries.is_empty()
    }

    pub(crate) fn j_slice(&self, entry: &IClusterEntry) -> &[JClusterEntry] {
        &self.j_entries[entry.cj_range.clone()]
    }
}

/// Structure-of-arrays particle data, padded to whole clusters.
///
/// Padding particles carry zero charge, type 0, and staggered far-away
/// coordinates so the cutoff check eliminates them from every interaction
/// without a dedicated filler mask.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AtomData {
    pub(crate) x: Vec<f64>,
    pub(crate) y: Vec<f64>,
    pub(crate) z: Vec<f64>,
    pub(crate) q: Vec<f64>,
    pub(crate) typ: Vec<usize>,
    pub(crate) group: Vec<usize>,
    n_real: usize,
    ngroups: usize,
}

/// Coordinate offset of the first padding particle; each further padding
/// particle is staggered by the same amount so no two coincide.
const PAD_OFFSET: f64 = 1.0e5;

impl AtomData {
    /// Build from positions, charges, and type indices; a single energy group.
    ///
    /// # Panics
    /// Panics if the slice lengths differ.
    pub fn new(positions: &[Vector3], charges: &[f64], types: &[usize]) -> Self {
        let groups = vec![0; positions.len()];
        Self::with_groups(positions, charges, types, &groups)
    }

    /// Build with explicit per-particle energy-group indices
    pub fn with_groups(
        positions: &[Vector3],
        charges: &[f64],
        types: &[usize],
        groups: &[usize],
    ) -> Self {
        let n = positions.len();
        assert_eq!(n, charges.len(), "charge count must match positions");
        assert_eq!(n, types.len(), "type count must match positions");
        assert_eq!(n, groups.len(), "group count must match positions");
        let padded = n.div_ceil(CLUSTER_SIZE) * CLUSTER_SIZE;
        let mut data = Self {
            x: Vec::with_capacity(padded),
            y: Vec::with_capacity(padded),
            z: Vec::with_capacity(padded),
            q: charges.to_vec(),
            typ: types.to_vec(),
            group: groups.to_vec(),
            n_real: n,
            ngroups: groups.iter().max().map_or(1, |&g| g + 1),
        };
        for p in positions {
            data.x.push(p.x);
            data.y.push(p.y);
            data.z.push(p.z);
        }
        for pad in 0..padded - n {
            let far = PAD_OFFSET * (pad + 1) as f64;
            data.x.push(far);
            data.y.push(far);
            data.z.push(far);
            data.q.push(0.0);
            data.typ.push(0);
            data.group.push(0);
        }
        data
    }

    /// Overwrite positions in place, e.g. between integration steps.
    ///
    /// # Panics
    /// Panics if the particle count differs from construction.
    pub fn set_positions(&mut self, positions: &[Vector3]) {
        assert_eq!(positions.len(), self.n_real, "particle count is immutable");
        for (i, p) in positions.iter().enumerate() {
            self.x[i] = p.x;
            self.y[i] = p.y;
            self.z[i] = p.z;
        }
    }

    /// Number of real (unpadded) particles
    pub fn len(&self) -> usize {
        self.n_real
    }

    /// True if there are no particles
    pub fn is_empty(&self) -> bool {
        self.n_real == 0
    }

    /// Number of clusters after padding
    pub fn n_clusters(&self) -> usize {
        self.x.len() / CLUSTER_SIZE
    }

    /// Number of energy groups
    pub fn ngroups(&self) -> usize {
        self.ngroups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_mask_keeps_upper_triangle() {
        let mask = diagonal_exclusion_mask();
        for i in 0..CLUSTER_SIZE {
            for j in 0..CLUSTER_SIZE {
                let set = mask & exclusion_bit(i, j) != 0;
                assert_eq!(set, j > i, "pair ({i},{j})");
            }
        }
    }

    #[test]
    fn test_push_entry_orders_masked_first() {
        let mut list = ClusterPairList::new();
        list.push_entry(
            0,
            0,
            true,
            true,
            false,
            [
                JClusterEntry { cj: 1, excl: EXCL_ALL },
                JClusterEntry { cj: 2, excl: 0x00ff },
                JClusterEntry { cj: 3, excl: EXCL_ALL },
            ],
        );
        let entry = &list.i_entries[0];
        let js = list.j_slice(entry);
        assert_eq!(js[0].cj, 2);
        assert!(js[1..].iter().all(|j| j.excl == EXCL_ALL));
    }

    #[test]
    fn test_diagonal_entry_gets_triangle_mask() {
        let mut list = ClusterPairList::new();
        list.push_entry(
            5,
            0,
            true,
            true,
            false,
            [JClusterEntry { cj: 5, excl: EXCL_ALL }],
        );
        let js = list.j_slice(&list.i_entries[0]);
        assert_eq!(js[0].excl, diagonal_exclusion_mask());
    }

    #[test]
    fn test_padding_is_inert_and_far() {
        let positions = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        let atoms = AtomData::new(&positions, &[1.0; 5], &[0; 5]);
        assert_eq!(atoms.len(), 5);
        assert_eq!(atoms.n_clusters(), 2);
        for pad in 5..8 {
            assert_eq!(atoms.q[pad], 0.0);
            assert!(atoms.x[pad] >= PAD_OFFSET);
        }
        // No two padding particles coincide
        assert_ne!(atoms.x[5], atoms.x[6]);
    }

    #[test]
    fn test_lj_row_classification() {
        let mut list = ClusterPairList::new();
        list.push_entry(0, 0, true, true, true, []);
        list.push_entry(1, 0, true, true, false, []);
        list.push_entry(2, 0, false, true, false, []);
        assert_eq!(list.i_entries[0].lj_rows(), 2);
        assert_eq!(list.i_entries[1].lj_rows(), 4);
        assert_eq!(list.i_entries[2].lj_rows(), 0);
    }
}
