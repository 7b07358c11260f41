//! Ghost synchronization: copy owner-assigned DoF indices to other ranks.
//!
//! After each rank has numbered what it owns, slots on ghost cells (and on
//! owned cells at entities owned elsewhere) are still invalid. A pass of the
//! protocol fills them by request/reply:
//!
//! 1. every marked ghost cell is addressed (coarse tree + forest path) in a
//!    request to its owner; every ghost owner gets exactly one request,
//!    possibly empty, so each rank knows how many requests it will receive;
//! 2. each rank answers every request with the current indices of the
//!    addressed cells, which it must own;
//! 3. replies are merged: invalid local slots take the received value, valid
//!    slots must agree with it, and cells that became complete are unmarked.
//!
//! Two passes are needed: after the first, every owned cell is complete, so
//! the second pass can serve ghost entities whose owner is not adjacent to
//! the requesting rank. Messages carry per-pass tags and a pass number in
//! their header; each pass ends in a barrier.

mod buffer;

pub use buffer::CellDataBuffer;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::enumerate::cell_is_complete;
use crate::algs::wire::{KIND_REPLY, KIND_REQUEST};
use crate::data::dof_store::{DofStore, Layer};
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::ownership::SubdomainId;
use crate::topology::triangulation::{CellId, Triangulation};
use crate::topology::visited::CellMarks;
use std::collections::BTreeMap;

/// Tags of the ghost synchronization, derived from one base tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GhostSyncTags {
    base: CommTag,
}

impl GhostSyncTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self { base }
    }

    fn layer_base(&self, layer: Layer) -> CommTag {
        match layer {
            Layer::Active => self.base,
            Layer::Level => self.base.offset(16),
        }
    }

    pub fn request(&self, layer: Layer, pass: u32) -> CommTag {
        self.layer_base(layer).offset(2 * pass as u16)
    }

    pub fn reply(&self, layer: Layer, pass: u32) -> CommTag {
        self.layer_base(layer).offset(2 * pass as u16 + 1)
    }
}

/// Protocol parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub tags: GhostSyncTags,
    /// flate2 level applied to every message.
    pub compression: u32,
}

/// Stage of a pass at which a failure was first seen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Marking,
    RequestsSent,
    RequestsAnswered,
}

fn owner_of<const D: usize>(tria: &Triangulation<D>, layer: Layer, id: CellId) -> SubdomainId {
    match layer {
        Layer::Active => tria.cell(id).subdomain_id(),
        Layer::Level => tria.cell(id).level_subdomain_id(),
    }
}

fn is_served_here<const D: usize>(tria: &Triangulation<D>, layer: Layer, id: CellId) -> bool {
    match layer {
        Layer::Active => tria.is_locally_owned(id),
        Layer::Level => tria.is_level_owned(id),
    }
}

fn is_remote<const D: usize>(tria: &Triangulation<D>, layer: Layer, id: CellId) -> bool {
    match layer {
        Layer::Active => tria.is_ghost(id),
        Layer::Level => tria.is_level_ghost(id),
    }
}

/// Marks for the first pass: every ghost (or level-ghost) cell.
pub fn initial_marks<const D: usize>(tria: &Triangulation<D>, layer: Layer) -> CellMarks {
    CellMarks::from_predicate(tria, |id| is_remote(tria, layer, id))
}

/// Run one request/reply pass over the cells in `marks`.
///
/// On return `marks` holds the cells that are still incomplete. The pass
/// always sends every message it owes and drains every send before
/// reporting the first error it met.
pub fn synchronize<const D: usize, C: Communicator>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    comm: &C,
    layer: Layer,
    marks: &mut CellMarks,
    config: &SyncConfig,
    pass: u32,
) -> Result<(), DofError> {
    let me = tria.locally_owned_subdomain();
    let neighbours: Vec<SubdomainId> = match layer {
        Layer::Active => tria.ghost_owners().iter().copied().collect(),
        Layer::Level => tria.level_ghost_owners().iter().copied().collect(),
    };
    let req_tag = config.tags.request(layer, pass);
    let rep_tag = config.tags.reply(layer, pass);

    // 1) address marked remote cells, tree by tree in depth-first order
    let mut failure: Option<(Phase, DofError)> = None;
    let mut requests: BTreeMap<SubdomainId, CellDataBuffer<D>> = neighbours
        .iter()
        .map(|&n| (n, CellDataBuffer::default()))
        .collect();
    for tree in 0..tria.n_trees() as u32 {
        let Some(root) = tria.coarse_cell(tree) else {
            continue;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if marks.contains(id) && is_remote(tria, layer, id) {
                let owner = owner_of(tria, layer, id);
                match requests.get_mut(&owner) {
                    Some(buf) => buf.push_cell(tree, *tria.cell(id).quadrant()),
                    None => record(
                        &mut failure,
                        Phase::Marking,
                        DofError::Precondition(format!(
                            "cell {id:?} is owned by {owner}, which is not a ghost owner of {me}"
                        )),
                    ),
                }
            }
            let children: Vec<CellId> = tria.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    // 2) exactly one request per neighbour, empty ones included
    let mut pending = Vec::with_capacity(2 * neighbours.len());
    for (&nbr, buf) in &requests {
        let bytes = buf
            .pack(KIND_REQUEST, pass, config.compression, nbr as usize)
            .unwrap_or_else(|e| {
                record(&mut failure, Phase::Marking, e);
                CellDataBuffer::<D>::pack_empty(KIND_REQUEST, pass, config.compression)
            });
        log::trace!("pass {pass}: {} cells requested from {nbr}", buf.len());
        pending.push(comm.isend(nbr as usize, req_tag, &bytes));
    }

    // 3) answer one request from every neighbour
    let mut scratch: Vec<DofIndex> = Vec::new();
    for _ in 0..neighbours.len() {
        let (src, bytes) = match comm.probe_recv(req_tag) {
            Ok(m) => m,
            Err(e) => {
                record(&mut failure, Phase::RequestsSent, e);
                break;
            }
        };
        let mut reply = CellDataBuffer::<D>::default();
        match CellDataBuffer::<D>::unpack(&bytes, KIND_REQUEST, pass, src) {
            Ok(req) => {
                for (tree, q) in req.cells() {
                    let served = match tria.locate(tree, &q) {
                        Some(id) if is_served_here(tria, layer, id) => Ok(id),
                        Some(id) => Err(DofError::ForeignCellRequest {
                            rank: me as usize,
                            cell: id,
                        }),
                        None => Err(DofError::UnknownCellAddress {
                            tree,
                            level: q.level,
                        }),
                    };
                    match served {
                        Ok(id) => {
                            store.cell_indices(layer, tria, id, &mut scratch);
                            reply.push_cell(tree, q);
                            reply.push_indices(&scratch);
                        }
                        Err(e) => record(&mut failure, Phase::RequestsSent, e),
                    }
                }
            }
            Err(e) => record(&mut failure, Phase::RequestsSent, e),
        }
        // the requester waits for one reply no matter what went wrong here
        let bytes = reply
            .pack(KIND_REPLY, pass, config.compression, src)
            .unwrap_or_else(|e| {
                record(&mut failure, Phase::RequestsSent, e);
                CellDataBuffer::<D>::pack_empty(KIND_REPLY, pass, config.compression)
            });
        log::trace!("pass {pass}: {} cells answered for {src}", reply.len());
        pending.push(comm.isend(src, rep_tag, &bytes));
    }

    // 4) merge one reply from every neighbour
    for _ in 0..neighbours.len() {
        let (src, bytes) = match comm.probe_recv(rep_tag) {
            Ok(m) => m,
            Err(e) => {
                record(&mut failure, Phase::RequestsAnswered, e);
                break;
            }
        };
        if let Err(e) = merge_reply(tria, store, layer, marks, &bytes, pass, src, &mut scratch) {
            record(&mut failure, Phase::RequestsAnswered, e);
        }
    }

    // 5) drain sends, then close the pass for everybody
    for h in pending {
        let _ = h.wait();
    }
    comm.barrier();

    match failure {
        Some((phase, e)) => {
            log::debug!("ghost sync pass {pass} ({layer:?}) failed in {phase:?}: {e}");
            Err(e)
        }
        None => {
            log::debug!(
                "ghost sync pass {pass} ({layer:?}): {} neighbours, {} cells still incomplete",
                neighbours.len(),
                marks.len()
            );
            Ok(())
        }
    }
}

/// Keep the first failure of a pass.
fn record(failure: &mut Option<(Phase, DofError)>, phase: Phase, e: DofError) {
    if failure.is_none() {
        *failure = Some((phase, e));
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_reply<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    layer: Layer,
    marks: &mut CellMarks,
    bytes: &[u8],
    pass: u32,
    src: usize,
    local: &mut Vec<DofIndex>,
) -> Result<(), DofError> {
    let reply = CellDataBuffer::<D>::unpack(bytes, KIND_REPLY, pass, src)?;
    let runs = reply.indices_per_cell(src)?;
    for ((tree, q), received) in reply.cells().zip(runs) {
        let id = tria
            .locate(tree, &q)
            .ok_or(DofError::UnknownCellAddress { tree, level: q.level })?;
        store.cell_indices(layer, tria, id, local);
        if local.len() != received.len() {
            return Err(DofError::Wire {
                neighbor: src,
                reason: format!(
                    "cell {id:?} has {} DoFs here but {} in the reply",
                    local.len(),
                    received.len()
                ),
            });
        }
        for (slot, (mine, &theirs)) in local.iter_mut().zip(received).enumerate() {
            if theirs == INVALID_DOF {
                continue;
            }
            if *mine == INVALID_DOF {
                *mine = theirs;
            } else if *mine != theirs {
                return Err(DofError::ConflictingDofIndex {
                    cell: id,
                    slot,
                    local: *mine,
                    received: theirs,
                    from: src,
                });
            }
        }
        store.set_cell_indices(layer, tria, id, local);
        if !local.contains(&INVALID_DOF) {
            marks.remove(id);
        }
    }
    Ok(())
}

/// Two passes starting from all ghost cells of `layer`.
///
/// The second pass runs even if the first failed, so peers are never left
/// waiting for this rank's pass-1 messages.
pub fn synchronize_ghosts<const D: usize, C: Communicator>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    comm: &C,
    layer: Layer,
    config: &SyncConfig,
) -> Result<(), DofError> {
    let mut marks = initial_marks(tria, layer);
    let first = synchronize(tria, store, comm, layer, &mut marks, config, 0);
    let second = synchronize(tria, store, comm, layer, &mut marks, config, 1);
    first.and(second)
}

/// Every owned and ghost cell of `layer` must be fully numbered.
pub fn verify_complete<const D: usize>(
    tria: &Triangulation<D>,
    store: &DofStore,
    layer: Layer,
) -> Result<(), DofError> {
    let ids: Box<dyn Iterator<Item = CellId> + '_> = match layer {
        Layer::Active => Box::new(tria.active_cell_ids()),
        Layer::Level => Box::new(tria.all_cell_ids()),
    };
    for id in ids {
        let owned = is_served_here(tria, layer, id);
        let ghost = is_remote(tria, layer, id);
        if (owned || ghost) && !cell_is_complete(tria, store, layer, id) {
            return Err(DofError::IncompleteNumbering { cell: id, ghost });
        }
    }
    Ok(())
}
