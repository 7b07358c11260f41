//! Mesh topology: forest addressing, the cell hierarchy and ownership.
//!
//! - [`forest`]: tree-relative cell addresses used on the wire
//! - [`triangulation`]: levels of cells with shared vertices, lines and quads
//! - [`ownership`]: subdomain partitioning, ghost and artificial cells
//! - [`visited`]: scoped visited sets for single-pass traversals

pub mod forest;
pub mod ownership;
pub mod reference;
pub mod triangulation;
pub mod visited;

pub use forest::TreeCell;
pub use ownership::{
    ARTIFICIAL_SUBDOMAIN, INVALID_SUBDOMAIN, PartitionKind, PartitionSettings, SubdomainId,
};
pub use triangulation::{Cell, CellId, Triangulation};
