//! Submission handlers.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, warn};

use relaygrid_correlator::SubmitError;

use crate::{ApiState, FILE_FIELD};

const NO_FILE: &str = "No file uploaded";

fn no_file() -> Response {
    (StatusCode::BAD_REQUEST, NO_FILE).into_response()
}

/// The filename becomes a blob key and the request body, so it has to be a
/// single path component.
fn is_plain_filename(filename: &str) -> bool {
    filename != "." && filename != ".." && !filename.contains(['/', '\\', '\0'])
}

/// Pull the `inputFile` part out of the form. `None` when the field is
/// absent or carries no filename.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(error = %e, "unreadable multipart body");
                return Err(e.into_response());
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let Some(filename) = field.file_name().filter(|f| !f.is_empty()).map(str::to_string)
        else {
            return Ok(None);
        };
        let data = field.bytes().await.map_err(|e| e.into_response())?;
        return Ok(Some((filename, data)));
    }
}

/// POST /
pub async fn submit_file(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Ok(mut multipart) = multipart else {
        return no_file();
    };
    let (filename, data) = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => return no_file(),
        Err(resp) => return resp,
    };
    if !is_plain_filename(&filename) {
        debug!(%filename, "rejected path-like filename");
        return (StatusCode::BAD_REQUEST, format!("Invalid file name: {filename}")).into_response();
    }

    match state.submitter.submit(data, &filename).await {
        Ok(outcome) => (StatusCode::OK, outcome.to_string()).into_response(),
        Err(SubmitError::MissingFile) => no_file(),
        Err(e @ SubmitError::Transport(_)) => {
            warn!(%filename, error = %e, "submission failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    "ok"
}
