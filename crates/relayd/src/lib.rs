//! relayd — assembles relaygrid into one process.
//!
//! [`Standalone`] wires the submission API, the response listener, the
//! fleet controller and a [`LocalFleet`] of in-process workers over the
//! local transport. The `relayd` binary wraps it with a CLI and signal
//! handling.

pub mod local_fleet;
pub mod standalone;

pub use local_fleet::{LocalFleet, WorkerFactory};
pub use standalone::{Standalone, seed_attributes};
