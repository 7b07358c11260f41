//! Summary of a numbering: global count, owned sets, per-partition counts.

use crate::data::DofIndex;
use crate::data::index_set::IndexSet;
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;
use serde::{Deserialize, Serialize};

/// Counts and ownership of a DoF numbering.
///
/// Rebuilt in full by every distribute or renumber call; never patched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberCache {
    pub n_global_dofs: DofIndex,
    pub n_locally_owned_dofs: DofIndex,
    pub locally_owned_dofs: IndexSet,
    pub n_locally_owned_dofs_per_processor: Vec<DofIndex>,
    pub locally_owned_dofs_per_processor: Vec<IndexSet>,
}

impl NumberCache {
    /// One partition owning `[0, n)`.
    pub fn serial(n: DofIndex) -> Self {
        let all = IndexSet::complete(n);
        Self {
            n_global_dofs: n,
            n_locally_owned_dofs: n,
            locally_owned_dofs: all.clone(),
            n_locally_owned_dofs_per_processor: vec![n],
            locally_owned_dofs_per_processor: vec![all],
        }
    }

    /// Contiguous blocks: partition `p` owns `counts[p]` indices after all lower partitions.
    pub fn from_counts(counts: &[DofIndex], my_rank: usize) -> Self {
        let n: DofIndex = counts.iter().sum();
        let mut sets = Vec::with_capacity(counts.len());
        let mut shift = 0;
        for &c in counts {
            let mut s = IndexSet::new(n);
            s.add_range(shift, shift + c);
            sets.push(s);
            shift += c;
        }
        Self::assemble(n, sets, my_rank)
    }

    /// Arbitrary per-partition owned sets, which must partition `[0, n)`.
    pub fn from_owned_sets(mut sets: Vec<IndexSet>, my_rank: usize) -> Result<Self, DofError> {
        if my_rank >= sets.len() {
            return Err(DofError::Precondition(format!(
                "rank {my_rank} has no owned set among {} partitions",
                sets.len()
            )));
        }
        let n: DofIndex = sets.iter().map(IndexSet::n_elements).sum();
        for s in &mut sets {
            s.set_size(n);
        }
        let cache = Self::assemble(n, sets, my_rank);
        cache.validate_partition()?;
        Ok(cache)
    }

    fn assemble(n: DofIndex, sets: Vec<IndexSet>, my_rank: usize) -> Self {
        let counts: Vec<DofIndex> = sets.iter().map(IndexSet::n_elements).collect();
        let mine = sets[my_rank].clone();
        Self {
            n_global_dofs: n,
            n_locally_owned_dofs: counts[my_rank],
            locally_owned_dofs: mine,
            n_locally_owned_dofs_per_processor: counts,
            locally_owned_dofs_per_processor: sets,
        }
    }

    /// Owned sets are pairwise disjoint and their union is `[0, n_global_dofs)`.
    pub fn validate_partition(&self) -> Result<(), DofError> {
        let mut all: Vec<std::ops::Range<u64>> = self
            .locally_owned_dofs_per_processor
            .iter()
            .flat_map(|s| s.ranges().iter().cloned())
            .collect();
        all.sort_by_key(|r| r.start);
        let mut next = 0;
        for r in &all {
            if r.start != next {
                return Err(DofError::InvalidPermutation(if r.start < next {
                    format!("index {} owned by more than one partition", r.start)
                } else {
                    format!("index {next} owned by no partition")
                }));
            }
            next = r.end;
        }
        if next != self.n_global_dofs {
            return Err(DofError::InvalidPermutation(format!(
                "owned sets cover [0, {next}) but {} DoFs exist",
                self.n_global_dofs
            )));
        }
        Ok(())
    }
}

impl DebugInvariants for NumberCache {
    fn validate_invariants(&self) -> Result<(), DofError> {
        for s in &self.locally_owned_dofs_per_processor {
            s.validate_invariants()?;
        }
        if self.locally_owned_dofs.n_elements() != self.n_locally_owned_dofs {
            return Err(DofError::Precondition(
                "owned count does not match owned set".into(),
            ));
        }
        self.validate_partition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_make_contiguous_blocks() {
        let c = NumberCache::from_counts(&[45, 36], 1);
        assert_eq!(c.n_global_dofs, 81);
        assert_eq!(c.locally_owned_dofs.ranges(), &[45..81]);
        c.validate_invariants().unwrap();
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        let a: IndexSet = [0, 1, 2].into_iter().collect();
        let b: IndexSet = [2, 3, 4].into_iter().collect();
        assert!(matches!(
            NumberCache::from_owned_sets(vec![a, b], 0),
            Err(DofError::InvalidPermutation(_))
        ));
    }

    #[test]
    fn interleaved_sets_are_fine() {
        let a: IndexSet = [0, 2, 4].into_iter().collect();
        let b: IndexSet = [1, 3].into_iter().collect();
        let c = NumberCache::from_owned_sets(vec![a, b], 1).unwrap();
        assert_eq!(c.n_locally_owned_dofs_per_processor, vec![3, 2]);
        assert_eq!(NumberCache::serial(5).n_locally_owned_dofs, 5);
    }

    #[test]
    fn serde_roundtrip() {
        let c = NumberCache::from_counts(&[3, 0, 4], 2);
        let json = serde_json::to_string(&c).unwrap();
        let back: NumberCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        back.validate_invariants().unwrap();
    }
}
