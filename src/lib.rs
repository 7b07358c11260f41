#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-dofs
//!
//! mesh-dofs numbers the degrees of freedom (DoFs) of a finite element on a
//! forest-of-trees mesh, serially, on a mesh shared by all ranks, or on a
//! mesh distributed across ranks.
//!
//! ## Features
//! - Per-entity DoF storage for the active mesh and for every level of the hierarchy
//! - First-touch enumeration with exactly-once numbering of shared vertices, lines and quads
//! - Renumbering by full or locally-owned permutations, Cuthill–McKee orderings
//! - Ghost synchronization by request/reply over a pluggable communicator
//!   (serial, in-process threads, MPI)
//! - [`NumberCache`](data::NumberCache) summaries with compact owned index sets
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-dofs = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! ```
//! use mesh_dofs::prelude::*;
//!
//! let mut tria = Triangulation::<2>::hyper_cube();
//! tria.refine_global(3)?;
//! let mut dh = DofHandler::new(&tria);
//! dh.distribute_dofs(&FiniteElement::lagrange(2, 1)?)?;
//! assert_eq!(dh.n_dofs(), 81);
//! # Ok::<(), DofError>(())
//! ```
//!
//! ## Parallel runs
//!
//! Partition the triangulation with
//! [`partition_shared`](topology::Triangulation::partition_shared) or
//! [`partition_distributed`](topology::Triangulation::partition_distributed)
//! and create the handler with a communicator whose rank and size match the
//! partition ([`DofHandler::with_comm`](dof_handler::DofHandler::with_comm)).
//! Every distribute and renumber call is then collective.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod dof_error;
pub mod dof_handler;
pub mod policy;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::rcm::{cuthill_mckee, cuthill_mckee_locally_owned};
    pub use crate::algs::renumbering::{invert, is_permutation};
    pub use crate::data::{DofIndex, FiniteElement, INVALID_DOF, IndexSet, NumberCache};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dof_error::{DofError, ErrorClass};
    pub use crate::dof_handler::{DofHandler, DofHandlerConfig};
    pub use crate::policy::DofPolicy;
    pub use crate::topology::{CellId, PartitionSettings, Triangulation};
}
