//! Numbering algorithms and the communication they rely on.

pub mod communicator;
pub mod enumerate;
pub mod ghost_sync;
pub mod rcm;
pub mod renumber;
pub mod renumbering;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
pub use rcm::{cuthill_mckee, cuthill_mckee_locally_owned};
