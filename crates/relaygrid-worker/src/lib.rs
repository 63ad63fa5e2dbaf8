//! relaygrid-worker — the producer side of the correlation contract.
//!
//! A [`Worker`] takes one job per iteration from the request channel:
//!
//! 1. download the input blob into scratch space
//! 2. run the [`Inference`] function on the local file
//! 3. upload the value to the output bucket under the correlation key
//! 4. optionally record it in the attribute store
//! 5. send `"<key>:<value>"` on the response channel
//! 6. delete the request message
//!
//! The request message is deleted only after steps 1–5 succeed. A failure
//! anywhere leaves it to reappear after the visibility timeout, so a job may
//! be processed more than once.

pub mod error;
pub mod inference;
pub mod worker;

pub use error::{WorkerError, WorkerResult};
pub use inference::{CommandInference, Inference};
pub use worker::Worker;
