//! DofError: Unified error type for mesh-dofs public APIs
//!
//! Every distribute / renumber / synchronize operation reports failures through
//! this type instead of panicking. After an error the numbering held by a
//! [`DofHandler`](crate::dof_handler::DofHandler) is considered invalid until the
//! next successful `distribute_dofs`.

use crate::data::dof_store::Entity;
use crate::topology::triangulation::CellId;
use thiserror::Error;

/// Coarse classification of a [`DofError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller handed in something the operation cannot work with.
    Precondition,
    /// An internal or distributed consistency property was found broken.
    InvariantViolation,
    /// The requested combination of mode and operation is not supported.
    NotImplemented,
    /// Transport or wire-format failure.
    Communication,
}

/// Unified error type for mesh-dofs operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DofError {
    /// The triangulation has no cells.
    #[error("triangulation is empty; nothing to distribute degrees of freedom on")]
    EmptyTriangulation,
    /// Generic precondition failure with context.
    #[error("precondition violated: {0}")]
    Precondition(String),
    /// Finite element and mesh disagree on the spatial dimension.
    #[error("finite element of dimension {fe_dim} used on a {mesh_dim}-dimensional mesh")]
    DimensionMismatch { fe_dim: usize, mesh_dim: usize },
    /// A query or renumbering was issued before `distribute_dofs`.
    #[error("degrees of freedom have not been distributed")]
    NotDistributed,
    /// Multilevel numbering was requested before `distribute_multilevel_dofs`.
    #[error("level {0} has no multilevel numbering")]
    NoLevelNumbering(usize),
    /// Refinement would exceed the addressable depth of a tree.
    #[error("refinement beyond maximum level {0}")]
    MaxLevelExceeded(u8),
    /// Cell id does not name a cell of the triangulation.
    #[error("cell {0:?} does not exist")]
    UnknownCell(CellId),
    /// Communicator and triangulation partition disagree.
    #[error(
        "communicator is rank {rank} of {size}, but the triangulation is partitioned as subdomain {subdomain} of {n_subdomains}"
    )]
    CommunicatorMismatch {
        rank: usize,
        size: usize,
        subdomain: u32,
        n_subdomains: u32,
    },
    /// A permutation is not a bijection where one is required.
    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),
    /// A renumbering lookup fell outside the permutation.
    #[error("permutation lookup at position {index} out of range (length {len})")]
    PermutationIndexOutOfRange { index: u64, len: usize },
    /// A restricted renumbering met an index outside the restricting set.
    #[error("index {0} is not part of the set the permutation is restricted to")]
    IndexNotInSet(u64),
    /// Some but not all slots of an entity carry a valid index.
    #[error("entity {0:?} has partially assigned DoF slots")]
    PartiallyAssignedEntity(Entity),
    /// A vertex in use by a cell still carries an invalid index.
    #[error("vertex {0} is used by a cell but carries an invalid DoF index")]
    InvalidDofOnUsedVertex(usize),
    /// Two sources disagree on the value of the same slot.
    #[error(
        "conflicting DoF index on cell {cell:?} slot {slot}: local {local}, received {received} from rank {from}"
    )]
    ConflictingDofIndex {
        cell: CellId,
        slot: usize,
        local: u64,
        received: u64,
        from: usize,
    },
    /// A cell that must be fully numbered still has invalid slots.
    #[error("cell {cell:?} (ghost: {ghost}) still has invalid DoF indices after synchronization")]
    IncompleteNumbering { cell: CellId, ghost: bool },
    /// A request addressed a cell that is not owned by the receiving rank.
    #[error("rank {rank} was asked for cell {cell:?}, which it does not own")]
    ForeignCellRequest { rank: usize, cell: CellId },
    /// A wire cell address does not resolve to a cell of the local forest.
    #[error("cell address (tree {tree}, level {level}) does not exist in the local forest")]
    UnknownCellAddress { tree: u32, level: u8 },
    /// A message could not be decoded.
    #[error("wire error from rank {neighbor}: {reason}")]
    Wire { neighbor: usize, reason: String },
    /// Transport failure.
    #[error("communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// Operation unsupported in the current partition mode.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl DofError {
    /// Classify this error along the taxonomy callers act on.
    pub fn class(&self) -> ErrorClass {
        use DofError::*;
        match self {
            EmptyTriangulation
            | Precondition(_)
            | DimensionMismatch { .. }
            | NotDistributed
            | NoLevelNumbering(_)
            | MaxLevelExceeded(_)
            | UnknownCell(_)
            | CommunicatorMismatch { .. }
            | InvalidPermutation(_) => ErrorClass::Precondition,
            PermutationIndexOutOfRange { .. }
            | IndexNotInSet(_)
            | PartiallyAssignedEntity(_)
            | InvalidDofOnUsedVertex(_)
            | ConflictingDofIndex { .. }
            | IncompleteNumbering { .. }
            | ForeignCellRequest { .. }
            | UnknownCellAddress { .. } => ErrorClass::InvariantViolation,
            Wire { .. } | CommError { .. } => ErrorClass::Communication,
            NotImplemented(_) => ErrorClass::NotImplemented,
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        self.class() == ErrorClass::NotImplemented
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(DofError::EmptyTriangulation.class(), ErrorClass::Precondition);
        assert_eq!(
            DofError::PermutationIndexOutOfRange { index: 9, len: 3 }.class(),
            ErrorClass::InvariantViolation
        );
        assert!(DofError::NotImplemented("x").is_not_implemented());
        assert_eq!(
            DofError::Wire {
                neighbor: 1,
                reason: "short".into()
            }
            .class(),
            ErrorClass::Communication
        );
    }

    #[test]
    fn display_mentions_payload() {
        let e = DofError::InvalidDofOnUsedVertex(17);
        assert!(e.to_string().contains("17"));
    }
}
