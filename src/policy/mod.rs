//! Numbering policies: how a handler numbers DoFs for each kind of mesh.
//!
//! The policy is fixed when the handler is created, from the partition kind
//! of its triangulation, and every operation dispatches on it once.

pub mod distributed;
pub mod sequential;
pub mod shared;

use crate::algs::communicator::Communicator;
use crate::algs::ghost_sync::SyncConfig;
use crate::data::DofIndex;
use crate::data::dof_store::DofStore;
use crate::data::number_cache::NumberCache;
use crate::dof_error::DofError;
use crate::topology::ownership::PartitionKind;
use crate::topology::triangulation::Triangulation;

/// Everything a policy operation touches.
pub struct PolicyContext<'a, const D: usize, C: Communicator> {
    pub tria: &'a Triangulation<D>,
    pub store: &'a mut DofStore,
    pub comm: &'a C,
    pub sync: SyncConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DofPolicy {
    /// One process numbers everything.
    Sequential,
    /// Every rank numbers the whole mesh the same way; ownership follows subdomains.
    ParallelShared,
    /// Each rank numbers what it owns; ghost indices are exchanged.
    ParallelDistributed,
}

impl DofPolicy {
    pub fn for_partition(kind: PartitionKind) -> Self {
        match kind {
            PartitionKind::Serial => DofPolicy::Sequential,
            PartitionKind::Shared => DofPolicy::ParallelShared,
            PartitionKind::Distributed => DofPolicy::ParallelDistributed,
        }
    }

    /// Rank and size of `comm` must match the mesh partition in parallel modes.
    pub fn check_communicator<const D: usize, C: Communicator>(
        self,
        tria: &Triangulation<D>,
        comm: &C,
    ) -> Result<(), DofError> {
        if self == DofPolicy::Sequential {
            return Ok(());
        }
        let p = tria.partition();
        if comm.rank() != p.my_subdomain as usize || comm.size() != p.n_subdomains as usize {
            return Err(DofError::CommunicatorMismatch {
                rank: comm.rank(),
                size: comm.size(),
                subdomain: p.my_subdomain,
                n_subdomains: p.n_subdomains,
            });
        }
        Ok(())
    }

    pub fn distribute_dofs<const D: usize, C: Communicator>(
        self,
        ctx: &mut PolicyContext<'_, D, C>,
    ) -> Result<NumberCache, DofError> {
        self.check_communicator(ctx.tria, ctx.comm)?;
        match self {
            DofPolicy::Sequential => sequential::distribute_dofs(ctx.tria, ctx.store),
            DofPolicy::ParallelShared => shared::distribute_dofs(ctx.tria, ctx.store),
            DofPolicy::ParallelDistributed => distributed::distribute_dofs(ctx),
        }
    }

    pub fn distribute_multilevel_dofs<const D: usize, C: Communicator>(
        self,
        ctx: &mut PolicyContext<'_, D, C>,
    ) -> Result<Vec<NumberCache>, DofError> {
        self.check_communicator(ctx.tria, ctx.comm)?;
        match self {
            DofPolicy::Sequential => sequential::distribute_multilevel_dofs(ctx.tria, ctx.store),
            DofPolicy::ParallelShared => shared::distribute_multilevel_dofs(ctx.tria, ctx.store),
            DofPolicy::ParallelDistributed => distributed::distribute_multilevel_dofs(ctx),
        }
    }

    /// `new_numbers` is a full permutation, or (parallel modes) one entry
    /// per locally owned DoF.
    pub fn renumber_dofs<const D: usize, C: Communicator>(
        self,
        ctx: &mut PolicyContext<'_, D, C>,
        current: &NumberCache,
        new_numbers: &[DofIndex],
    ) -> Result<NumberCache, DofError> {
        self.check_communicator(ctx.tria, ctx.comm)?;
        match self {
            DofPolicy::Sequential => {
                sequential::renumber_dofs(ctx.tria, ctx.store, current, new_numbers)
            }
            DofPolicy::ParallelShared => shared::renumber_dofs(ctx, current, new_numbers),
            DofPolicy::ParallelDistributed => distributed::renumber_dofs(ctx, current, new_numbers),
        }
    }

    pub fn renumber_level_dofs<const D: usize, C: Communicator>(
        self,
        ctx: &mut PolicyContext<'_, D, C>,
        level: usize,
        current: &NumberCache,
        new_numbers: &[DofIndex],
    ) -> Result<NumberCache, DofError> {
        match self {
            DofPolicy::Sequential => {
                sequential::renumber_level_dofs(ctx.tria, ctx.store, level, current, new_numbers)
            }
            DofPolicy::ParallelShared | DofPolicy::ParallelDistributed => Err(
                DofError::NotImplemented("level renumbering on a partitioned mesh"),
            ),
        }
    }
}

/// Set every index to its position among the valid ones; returns the count.
pub(crate) fn compact(renumbering: &mut [DofIndex]) -> DofIndex {
    let mut next = 0;
    for i in renumbering
        .iter_mut()
        .filter(|i| **i != crate::data::INVALID_DOF)
    {
        *i = next;
        next += 1;
    }
    next
}
