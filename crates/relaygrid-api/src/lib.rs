//! relaygrid-api — HTTP front end for synchronous submission.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/` | Submit the multipart field `inputFile`, block for the outcome |
//! | GET | `/healthz` | Liveness probe |
//!
//! `POST /` answers `200` with `"<key>:<value>"` in plain text, including
//! `"<key>:Timeout"` when no worker answered in time. A request without a
//! file gets `400 No file uploaded`; a store or queue failure gets `502`.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use relaygrid_correlator::Submit;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Multipart field carrying the file.
pub const FILE_FIELD: &str = "inputFile";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub submitter: Arc<dyn Submit>,
}

/// Build the submission router.
pub fn build_router(submitter: Arc<dyn Submit>) -> Router {
    let state = ApiState { submitter };

    Router::new()
        .route("/", post(handlers::submit_file))
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
