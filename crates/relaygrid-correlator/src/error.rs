//! Submission error types.

use thiserror::Error;

use relaygrid_queue::TransportError;

pub type SubmitResult<T> = Result<T, SubmitError>;

/// Errors surfaced to the submitting caller. A missing result is not an
/// error: it comes back as a `Timeout` outcome.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no file uploaded")]
    MissingFile,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
