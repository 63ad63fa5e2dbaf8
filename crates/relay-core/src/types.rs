//! Shared types used across relaygrid crates.
//!
//! The wire contract between the front end and the worker tier is
//! small: the request channel carries the input filename, the
//! response channel carries `"<key>:<value>"`, and both sides derive the
//! correlation key from the filename with [`correlation_key`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::SystemTime;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future used by the collaborator traits so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Value reported to the caller when no result arrived before the deadline.
pub const TIMEOUT_VALUE: &str = "Timeout";

/// Value the inference tier reports when the input holds no face.
pub const NO_FACE_VALUE: &str = "No-Face";

/// Value read from the attribute store when nothing has been recorded.
pub const UNKNOWN_VALUE: &str = "Unknown";

/// Attribute name under which outcomes are recorded in the attribute store.
pub const RECOGNITION_ATTRIBUTE: &str = "recognition";

/// Errors raised while decoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed result message: {0:?}")]
    MalformedMessage(String),
}

/// Derive the correlation key for an input filename.
///
/// Strips the last extension only: `a.jpg` → `a`, `archive.tar.gz` →
/// `archive.tar`. A leading dot is not an extension (`.hidden` stays as is).
pub fn correlation_key(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if filename[..idx].trim_start_matches('.').is_empty() => filename,
        Some(idx) => &filename[..idx],
        None => filename,
    }
}

/// A unit of submitted work.
#[derive(Debug, Clone)]
pub struct Job {
    /// Correlation key derived from `filename`.
    pub key: String,
    /// Input filename, used as the blob key and the request message body.
    pub filename: String,
    pub payload: Bytes,
    pub submitted_at: SystemTime,
}

impl Job {
    pub fn new(filename: impl Into<String>, payload: Bytes) -> Self {
        let filename = filename.into();
        Self {
            key: correlation_key(&filename).to_string(),
            filename,
            payload,
            submitted_at: SystemTime::now(),
        }
    }
}

/// Result of one job, as carried on the response channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub key: String,
    pub value: String,
}

impl Outcome {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The outcome reported when the caller's deadline expires.
    pub fn timeout(key: impl Into<String>) -> Self {
        Self::new(key, TIMEOUT_VALUE)
    }

    pub fn is_timeout(&self) -> bool {
        self.value == TIMEOUT_VALUE
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    /// Parse `"<key>:<value>"`. The key is everything before the first `:`;
    /// the value may itself contain colons.
    fn from_str(body: &str) -> Result<Self, Self::Err> {
        match body.split_once(':') {
            Some((key, value)) if !key.is_empty() => Ok(Self::new(key, value)),
            _ => Err(CoreError::MalformedMessage(body.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strips_last_extension() {
        assert_eq!(correlation_key("a.jpg"), "a");
        assert_eq!(correlation_key("archive.tar.gz"), "archive.tar");
        assert_eq!(correlation_key("noext"), "noext");
        assert_eq!(correlation_key(".hidden"), ".hidden");
        assert_eq!(correlation_key("test_00.png"), "test_00");
    }

    #[test]
    fn job_derives_key_from_filename() {
        let job = Job::new("face_17.jpg", Bytes::from_static(b"\xff\xd8"));
        assert_eq!(job.key, "face_17");
        assert_eq!(job.filename, "face_17.jpg");
        assert_eq!(job.payload.len(), 2);
    }

    #[test]
    fn parse_splits_on_first_colon() {
        let outcome: Outcome = "a:Paul:extra".parse().unwrap();
        assert_eq!(outcome, Outcome::new("a", "Paul:extra"));
        assert_eq!(outcome.to_string(), "a:Paul:extra");
    }

    #[test]
    fn parse_rejects_missing_delimiter_or_key() {
        assert!(matches!(
            "no-delimiter".parse::<Outcome>(),
            Err(CoreError::MalformedMessage(_))
        ));
        assert!(":orphan".parse::<Outcome>().is_err());
    }

    #[test]
    fn empty_value_is_allowed() {
        let outcome: Outcome = "a:".parse().unwrap();
        assert_eq!(outcome.value, "");
    }

    #[test]
    fn timeout_outcome_formats_for_callers() {
        let outcome = Outcome::timeout("a");
        assert!(outcome.is_timeout());
        assert_eq!(outcome.to_string(), "a:Timeout");
    }
}
