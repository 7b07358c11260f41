//! Subdomain ownership of cells.
//!
//! Partitioning assigns every active cell an owning subdomain. From the
//! perspective of one rank, an active cell is then *locally owned*, a *ghost*
//! (owned elsewhere but sharing at least one vertex with a locally owned
//! cell) or *artificial* (neither; its data is never consulted). With a
//! multigrid hierarchy the same classification is made per level using the
//! level subdomain of every cell.

use crate::dof_error::DofError;
use crate::topology::triangulation::{Cell, CellId, Triangulation};
use hashbrown::HashMap;
use itertools::Itertools;
use std::collections::BTreeSet;

/// Index of a subdomain; equals the owning rank in parallel runs.
pub type SubdomainId = u32;

/// "No subdomain": level subdomains of meshes without a multigrid hierarchy.
pub const INVALID_SUBDOMAIN: SubdomainId = u32::MAX;
/// Marker for cells this rank knows nothing about.
pub const ARTIFICIAL_SUBDOMAIN: SubdomainId = u32::MAX - 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PartitionKind {
    /// Single process, every cell in subdomain 0.
    Serial,
    /// Every rank stores the whole mesh; cells carry subdomain ids.
    Shared,
    /// Each rank only trusts owned and ghost cells.
    Distributed,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PartitionSettings {
    /// Shared meshes: mark cells away from the local subdomain artificial.
    pub with_artificial_cells: bool,
    /// Distributed meshes: assign level subdomains to every level cell.
    pub construct_multigrid_hierarchy: bool,
}

/// Partition state of a triangulation as seen by one rank.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Partition {
    pub kind: PartitionKind,
    pub my_subdomain: SubdomainId,
    pub n_subdomains: u32,
    pub settings: PartitionSettings,
    ghost_owners: BTreeSet<SubdomainId>,
    level_ghost_owners: BTreeSet<SubdomainId>,
}

impl Partition {
    pub fn serial() -> Self {
        Self {
            kind: PartitionKind::Serial,
            my_subdomain: 0,
            n_subdomains: 1,
            settings: PartitionSettings::default(),
            ghost_owners: BTreeSet::new(),
            level_ghost_owners: BTreeSet::new(),
        }
    }
}

impl<const D: usize> Triangulation<D> {
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn locally_owned_subdomain(&self) -> SubdomainId {
        self.partition.my_subdomain
    }

    /// Subdomains owning at least one ghost cell of this rank.
    pub fn ghost_owners(&self) -> &BTreeSet<SubdomainId> {
        &self.partition.ghost_owners
    }

    /// Level subdomains owning at least one level-ghost cell, over all levels.
    pub fn level_ghost_owners(&self) -> &BTreeSet<SubdomainId> {
        &self.partition.level_ghost_owners
    }

    pub fn is_locally_owned(&self, id: CellId) -> bool {
        let c = self.cell(id);
        c.is_active() && c.subdomain_id == self.partition.my_subdomain
    }

    pub fn is_artificial(&self, id: CellId) -> bool {
        self.cell(id).subdomain_id == ARTIFICIAL_SUBDOMAIN
    }

    pub fn is_ghost(&self, id: CellId) -> bool {
        let c = self.cell(id);
        c.is_active()
            && c.subdomain_id != self.partition.my_subdomain
            && c.subdomain_id != ARTIFICIAL_SUBDOMAIN
    }

    pub fn is_level_owned(&self, id: CellId) -> bool {
        self.cell(id).level_subdomain_id == self.partition.my_subdomain
    }

    pub fn is_level_artificial(&self, id: CellId) -> bool {
        self.cell(id).level_subdomain_id == ARTIFICIAL_SUBDOMAIN
    }

    pub fn is_level_ghost(&self, id: CellId) -> bool {
        let s = self.cell(id).level_subdomain_id;
        s != self.partition.my_subdomain && s != ARTIFICIAL_SUBDOMAIN && s != INVALID_SUBDOMAIN
    }

    /// Equal-size chunks of the active cells in tree-then-z order.
    pub fn z_order_owners(&self, n_parts: u32) -> HashMap<CellId, SubdomainId> {
        let ordered: Vec<CellId> = self
            .active_cell_ids()
            .sorted_by_key(|&id| {
                let c = self.cell(id);
                (c.tree(), c.quadrant().morton_key())
            })
            .collect();
        let n = ordered.len().max(1) as u64;
        ordered
            .into_iter()
            .enumerate()
            .map(|(k, id)| (id, (k as u64 * u64::from(n_parts) / n) as SubdomainId))
            .collect()
    }

    /// Partition for a shared mesh: all ranks store everything.
    pub fn partition_shared<F>(
        &mut self,
        n_subdomains: u32,
        my_subdomain: SubdomainId,
        settings: PartitionSettings,
        owner: F,
    ) -> Result<(), DofError>
    where
        F: Fn(CellId, &Cell<D>) -> SubdomainId,
    {
        self.assign_true_owners(n_subdomains, my_subdomain, owner)?;
        let touching = self.vertices_of_owned(my_subdomain);
        for id in self.active_cell_ids().collect::<Vec<_>>() {
            let c = self.cell_mut(id);
            c.subdomain_id = c.true_subdomain_id;
            if settings.with_artificial_cells
                && c.true_subdomain_id != my_subdomain
                && !c.vertices().iter().any(|&v| touching[v])
            {
                c.subdomain_id = ARTIFICIAL_SUBDOMAIN;
            }
        }
        self.finish_partition(PartitionKind::Shared, n_subdomains, my_subdomain, settings);
        Ok(())
    }

    /// Partition for a distributed mesh.
    ///
    /// Cells away from the local subdomain become artificial. With
    /// `construct_multigrid_hierarchy`, a refined cell is level-owned by the
    /// level owner of its first child.
    pub fn partition_distributed<F>(
        &mut self,
        n_subdomains: u32,
        my_subdomain: SubdomainId,
        settings: PartitionSettings,
        owner: F,
    ) -> Result<(), DofError>
    where
        F: Fn(CellId, &Cell<D>) -> SubdomainId,
    {
        self.assign_true_owners(n_subdomains, my_subdomain, owner)?;
        let touching = self.vertices_of_owned(my_subdomain);
        for id in self.active_cell_ids().collect::<Vec<_>>() {
            let c = self.cell_mut(id);
            c.subdomain_id = if c.true_subdomain_id == my_subdomain
                || c.vertices().iter().any(|&v| touching[v])
            {
                c.true_subdomain_id
            } else {
                ARTIFICIAL_SUBDOMAIN
            };
        }
        if settings.construct_multigrid_hierarchy {
            self.assign_level_owners(my_subdomain);
        }
        self.finish_partition(PartitionKind::Distributed, n_subdomains, my_subdomain, settings);
        Ok(())
    }

    fn assign_true_owners<F>(
        &mut self,
        n_subdomains: u32,
        my_subdomain: SubdomainId,
        owner: F,
    ) -> Result<(), DofError>
    where
        F: Fn(CellId, &Cell<D>) -> SubdomainId,
    {
        if my_subdomain >= n_subdomains {
            return Err(DofError::Precondition(format!(
                "subdomain {my_subdomain} out of range for {n_subdomains} subdomains"
            )));
        }
        for id in self.all_cell_ids().collect::<Vec<_>>() {
            let active = self.cell(id).is_active();
            let s = if active { owner(id, self.cell(id)) } else { 0 };
            if s >= n_subdomains {
                return Err(DofError::Precondition(format!(
                    "cell {id:?} assigned to subdomain {s}, but only {n_subdomains} exist"
                )));
            }
            let c = self.cell_mut(id);
            c.true_subdomain_id = s;
            c.subdomain_id = s;
            c.level_subdomain_id = INVALID_SUBDOMAIN;
        }
        Ok(())
    }

    fn vertices_of_owned(&self, my_subdomain: SubdomainId) -> Vec<bool> {
        let mut touching = vec![false; self.n_vertices()];
        for id in self.active_cell_ids() {
            let c = self.cell(id);
            if c.true_subdomain_id == my_subdomain {
                for &v in c.vertices() {
                    touching[v] = true;
                }
            }
        }
        touching
    }

    fn assign_level_owners(&mut self, my_subdomain: SubdomainId) {
        let n_levels = self.n_levels();
        let mut owners: Vec<Vec<SubdomainId>> =
            (0..n_levels).map(|l| vec![0; self.n_cells(l)]).collect();
        for level in (0..n_levels).rev() {
            for id in self.cell_ids(level) {
                let c = self.cell(id);
                owners[level][id.index] = match self.child(id, 0) {
                    None => c.true_subdomain_id,
                    Some(first) => owners[level + 1][first.index],
                };
            }
        }
        for level in 0..n_levels {
            let mut touching = vec![false; self.n_vertices()];
            for id in self.cell_ids(level) {
                if owners[level][id.index] == my_subdomain {
                    for &v in self.cell(id).vertices() {
                        touching[v] = true;
                    }
                }
            }
            for id in self.cell_ids(level).collect::<Vec<_>>() {
                let s = owners[level][id.index];
                let c = self.cell_mut(id);
                c.level_subdomain_id =
                    if s == my_subdomain || c.vertices().iter().any(|&v| touching[v]) {
                        s
                    } else {
                        ARTIFICIAL_SUBDOMAIN
                    };
            }
        }
    }

    fn finish_partition(
        &mut self,
        kind: PartitionKind,
        n_subdomains: u32,
        my_subdomain: SubdomainId,
        settings: PartitionSettings,
    ) {
        self.partition = Partition {
            kind,
            my_subdomain,
            n_subdomains,
            settings,
            ghost_owners: BTreeSet::new(),
            level_ghost_owners: BTreeSet::new(),
        };
        let ghosts: BTreeSet<SubdomainId> = self
            .active_cell_ids()
            .filter(|&id| self.is_ghost(id))
            .map(|id| self.cell(id).subdomain_id)
            .collect();
        let level_ghosts: BTreeSet<SubdomainId> = self
            .all_cell_ids()
            .filter(|&id| self.is_level_ghost(id))
            .map(|id| self.cell(id).level_subdomain_id)
            .collect();
        self.partition.ghost_owners = ghosts;
        self.partition.level_ghost_owners = level_ghosts;
        self.refresh_vertex_usage();
        log::debug!(
            "partitioned as {:?}: subdomain {}/{}, ghost owners {:?}",
            kind,
            my_subdomain,
            n_subdomains,
            self.partition.ghost_owners
        );
    }
}
