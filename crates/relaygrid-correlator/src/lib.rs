//! relaygrid-correlator — bridges blocking callers to results produced
//! asynchronously by the worker tier.
//!
//! ```text
//! Submitter ──put──▶ input bucket        worker tier
//!     │     ──send─▶ request channel ──▶ (elsewhere) ──▶ response channel
//!     │                                                        │
//!     └── wait(key) ◀── Correlator ◀── insert ◀── ResponseListener
//! ```
//!
//! Results arrive out of order and are matched purely by correlation key.
//! The [`Correlator`] holds them until the waiting [`Submitter`] claims
//! them (pop-on-read). The [`AttributeSubmitter`] is the polling variant
//! that reads outcomes from the attribute store instead.
//!
//! # Known hazard
//!
//! A result that arrives after its submitter timed out stays in the table
//! until a later submission with the same key claims it. Submitters discard
//! residue for their key before enqueueing, but a late duplicate landing
//! while a newer submission is already waiting will be handed to that newer
//! submission. There is no generation check on the wire to prevent it.

pub mod correlator;
pub mod error;
pub mod listener;
pub mod submitter;

pub use correlator::{Correlator, WaitOutcome};
pub use error::{SubmitError, SubmitResult};
pub use listener::ResponseListener;
pub use submitter::{AttributeSubmitter, Submit, Submitter};
