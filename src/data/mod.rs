//! Data module: finite element layout, DoF slots and numbering summaries

pub mod dof_store;
pub mod fe;
pub mod index_set;
pub mod number_cache;

/// A global degree-of-freedom index.
pub type DofIndex = u64;

/// Sentinel for an unassigned slot. Distinct from every valid index.
pub const INVALID_DOF: DofIndex = u64::MAX;

pub use dof_store::{DofStore, Entity, Layer};
pub use fe::FiniteElement;
pub use index_set::IndexSet;
pub use number_cache::NumberCache;
