//! Fleet API error types.

use thiserror::Error;

pub type FleetResult<T> = Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("fleet API unavailable: {0}")]
    Unavailable(String),
}
