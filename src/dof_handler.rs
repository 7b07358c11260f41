//! The application-facing handle: distribute, renumber and query DoFs.
//!
//! A [`DofHandler`] borrows a [`Triangulation`] and picks its numbering
//! policy from the triangulation's partition kind. Any failed operation
//! leaves the handler without a numbering until the next successful
//! [`distribute_dofs`](DofHandler::distribute_dofs).

use crate::algs::communicator::{CommTag, Communicator, NoComm};
use crate::algs::ghost_sync::{GhostSyncTags, SyncConfig};
use crate::data::dof_store::{DofStore, Layer};
use crate::data::fe::FiniteElement;
use crate::data::index_set::IndexSet;
use crate::data::number_cache::NumberCache;
use crate::data::{DofIndex, INVALID_DOF};
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;
use crate::policy::{DofPolicy, PolicyContext};
use crate::topology::triangulation::{CellId, Triangulation};

/// Tunables of a [`DofHandler`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DofHandlerConfig {
    /// Base tag of the ghost synchronization; every pass and phase derives its own.
    pub sync_tag: CommTag,
    /// flate2 level (0–9) for ghost synchronization messages.
    pub compression: u32,
    /// Check that owned sets partition `[0, n_dofs)` after every operation.
    pub verify_partition: bool,
}

impl Default for DofHandlerConfig {
    fn default() -> Self {
        Self {
            sync_tag: CommTag::new(0x4D00),
            compression: 6,
            verify_partition: true,
        }
    }
}

impl DofHandlerConfig {
    pub fn with_sync_tag(mut self, tag: CommTag) -> Self {
        self.sync_tag = tag;
        self
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = level.min(9);
        self
    }

    pub fn with_verify_partition(mut self, on: bool) -> Self {
        self.verify_partition = on;
        self
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            tags: GhostSyncTags::from_base(self.sync_tag),
            compression: self.compression,
        }
    }
}

pub struct DofHandler<'a, const D: usize, C: Communicator = NoComm> {
    tria: &'a Triangulation<D>,
    comm: C,
    config: DofHandlerConfig,
    policy: DofPolicy,
    fe: Option<FiniteElement>,
    store: Option<DofStore>,
    number_cache: NumberCache,
    level_number_caches: Vec<NumberCache>,
}

impl<'a, const D: usize> DofHandler<'a, D, NoComm> {
    /// Handler for a serial run.
    pub fn new(tria: &'a Triangulation<D>) -> Self {
        Self::with_comm(tria, NoComm)
    }
}

impl<'a, const D: usize, C: Communicator> DofHandler<'a, D, C> {
    pub fn with_comm(tria: &'a Triangulation<D>, comm: C) -> Self {
        let policy = DofPolicy::for_partition(tria.partition().kind);
        log::debug!(
            "dof handler on rank {} of {}: {policy:?}",
            comm.rank(),
            comm.size()
        );
        Self {
            tria,
            comm,
            config: DofHandlerConfig::default(),
            policy,
            fe: None,
            store: None,
            number_cache: NumberCache::default(),
            level_number_caches: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: DofHandlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DofHandlerConfig {
        &self.config
    }

    pub fn policy(&self) -> DofPolicy {
        self.policy
    }

    pub fn triangulation(&self) -> &'a Triangulation<D> {
        self.tria
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    pub fn finite_element(&self) -> Option<&FiniteElement> {
        self.fe.as_ref()
    }

    /// Raw slot storage, once DoFs are distributed.
    pub fn store(&self) -> Option<&DofStore> {
        self.store.as_ref()
    }

    /// Number the active DoFs of `fe` on the whole mesh.
    pub fn distribute_dofs(&mut self, fe: &FiniteElement) -> Result<(), DofError> {
        if fe.dim() != D {
            return Err(DofError::DimensionMismatch {
                fe_dim: fe.dim(),
                mesh_dim: D,
            });
        }
        if self.tria.n_levels() == 0 {
            self.invalidate();
            return Err(DofError::EmptyTriangulation);
        }
        self.fe = Some(fe.clone());
        self.level_number_caches.clear();
        let mut store = DofStore::new(self.tria, fe);
        let mut ctx = PolicyContext {
            tria: self.tria,
            store: &mut store,
            comm: &self.comm,
            sync: self.config.sync_config(),
        };
        let result = self.policy.distribute_dofs(&mut ctx);
        match result.and_then(|cache| self.checked(cache)) {
            Ok(cache) => {
                log::debug!(
                    "distributed {} DoFs, {} locally owned",
                    cache.n_global_dofs,
                    cache.n_locally_owned_dofs
                );
                self.number_cache = cache;
                self.store = Some(store);
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Number every level of the hierarchy independently.
    ///
    /// Needs [`distribute_dofs`](Self::distribute_dofs) first.
    pub fn distribute_multilevel_dofs(&mut self) -> Result<(), DofError> {
        let store = self.store.as_mut().ok_or(DofError::NotDistributed)?;
        let mut ctx = PolicyContext {
            tria: self.tria,
            store,
            comm: &self.comm,
            sync: self.config.sync_config(),
        };
        let result = self.policy.distribute_multilevel_dofs(&mut ctx).and_then(|caches| {
            caches
                .into_iter()
                .map(|c| self.checked(c))
                .collect::<Result<Vec<_>, _>>()
        });
        match result {
            Ok(caches) => {
                self.level_number_caches = caches;
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Apply `new_numbers` to the active numbering.
    ///
    /// Sequential meshes take a permutation of all DoFs. Partitioned meshes
    /// also take one new index per locally owned DoF (distributed meshes
    /// only take that form). Collective on parallel meshes.
    pub fn renumber_dofs(&mut self, new_numbers: &[DofIndex]) -> Result<(), DofError> {
        let store = self.store.as_mut().ok_or(DofError::NotDistributed)?;
        let mut ctx = PolicyContext {
            tria: self.tria,
            store,
            comm: &self.comm,
            sync: self.config.sync_config(),
        };
        let result = self
            .policy
            .renumber_dofs(&mut ctx, &self.number_cache, new_numbers)
            .and_then(|cache| self.checked(cache));
        match result {
            Ok(cache) => {
                self.number_cache = cache;
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Apply a permutation of all DoFs of `level` to the multilevel numbering.
    pub fn renumber_level_dofs(
        &mut self,
        level: usize,
        new_numbers: &[DofIndex],
    ) -> Result<(), DofError> {
        let current = self
            .level_number_caches
            .get(level)
            .cloned()
            .ok_or(DofError::NoLevelNumbering(level))?;
        let store = self.store.as_mut().ok_or(DofError::NotDistributed)?;
        let mut ctx = PolicyContext {
            tria: self.tria,
            store,
            comm: &self.comm,
            sync: self.config.sync_config(),
        };
        match self
            .policy
            .renumber_level_dofs(&mut ctx, level, &current, new_numbers)
        {
            Ok(cache) => {
                self.level_number_caches[level] = cache;
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    fn checked(&self, cache: NumberCache) -> Result<NumberCache, DofError> {
        if self.config.verify_partition {
            cache.validate_partition()?;
        }
        cache.debug_assert_invariants();
        Ok(cache)
    }

    fn invalidate(&mut self) {
        log::debug!("numbering invalidated");
        self.store = None;
        self.number_cache = NumberCache::default();
        self.level_number_caches.clear();
    }

    /// Forget the numbering and the finite element.
    pub fn clear(&mut self) {
        self.invalidate();
        self.fe = None;
    }

    pub fn has_dofs(&self) -> bool {
        self.store.is_some()
    }

    pub fn has_level_dofs(&self) -> bool {
        !self.level_number_caches.is_empty()
    }

    pub fn n_dofs(&self) -> DofIndex {
        self.number_cache.n_global_dofs
    }

    pub fn n_locally_owned_dofs(&self) -> DofIndex {
        self.number_cache.n_locally_owned_dofs
    }

    pub fn locally_owned_dofs(&self) -> &IndexSet {
        &self.number_cache.locally_owned_dofs
    }

    pub fn n_locally_owned_dofs_per_processor(&self) -> &[DofIndex] {
        &self.number_cache.n_locally_owned_dofs_per_processor
    }

    pub fn locally_owned_dofs_per_processor(&self) -> &[IndexSet] {
        &self.number_cache.locally_owned_dofs_per_processor
    }

    pub fn number_cache(&self) -> &NumberCache {
        &self.number_cache
    }

    pub fn level_number_cache(&self, level: usize) -> Result<&NumberCache, DofError> {
        self.level_number_caches
            .get(level)
            .ok_or(DofError::NoLevelNumbering(level))
    }

    pub fn n_level_dofs(&self, level: usize) -> Result<DofIndex, DofError> {
        self.level_number_cache(level).map(|c| c.n_global_dofs)
    }

    /// DoF indices of an active cell in cell order (vertices, lines, quads,
    /// interior). Artificial cells report invalid entries.
    pub fn cell_dof_indices(&self, id: CellId) -> Result<Vec<DofIndex>, DofError> {
        let store = self.store.as_ref().ok_or(DofError::NotDistributed)?;
        let cell = self.tria.try_cell(id)?;
        if !cell.is_active() {
            return Err(DofError::Precondition(format!(
                "cell {id:?} is refined and has no active DoFs"
            )));
        }
        let mut out = Vec::with_capacity(capacity_hint(self.fe.as_ref()));
        store.cell_indices(Layer::Active, self.tria, id, &mut out);
        Ok(out)
    }

    /// Multilevel DoF indices of any cell.
    pub fn level_cell_dof_indices(&self, id: CellId) -> Result<Vec<DofIndex>, DofError> {
        let store = self.store.as_ref().ok_or(DofError::NotDistributed)?;
        self.tria.try_cell(id)?;
        if !self.has_level_dofs() {
            return Err(DofError::NoLevelNumbering(id.level));
        }
        let mut out = Vec::with_capacity(capacity_hint(self.fe.as_ref()));
        store.cell_indices(Layer::Level, self.tria, id, &mut out);
        Ok(out)
    }

    /// Owned DoFs plus every DoF on a ghost cell.
    pub fn locally_relevant_dofs(&self) -> Result<IndexSet, DofError> {
        let store = self.store.as_ref().ok_or(DofError::NotDistributed)?;
        let mut relevant = self.number_cache.locally_owned_dofs.clone();
        let mut buf = Vec::new();
        for id in self.tria.active_cell_ids().filter(|&id| self.tria.is_ghost(id)) {
            store.cell_indices(Layer::Active, self.tria, id, &mut buf);
            relevant.add_indices(buf.iter().copied().filter(|&i| i != INVALID_DOF));
        }
        Ok(relevant)
    }
}

fn capacity_hint(fe: Option<&FiniteElement>) -> usize {
    fe.map_or(0, FiniteElement::dofs_per_cell)
}
