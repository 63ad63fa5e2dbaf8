//! Submitters: accept a payload, hand it to the worker tier, and block
//! until the correlated outcome is known or the deadline passes.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use relay_core::{
    BoxFuture, Job, Outcome, RECOGNITION_ATTRIBUTE, RelayConfig, UNKNOWN_VALUE,
};
use relaygrid_queue::Transport;

use crate::correlator::{Correlator, WaitOutcome};
use crate::error::{SubmitError, SubmitResult};

/// Something that turns an uploaded file into an outcome.
///
/// The caller renders the outcome as `"<key>:<value>"`. A timeout is an
/// outcome (`"<key>:Timeout"`), not an error.
pub trait Submit: Send + Sync {
    fn submit<'a>(&'a self, payload: Bytes, filename: &'a str) -> BoxFuture<'a, SubmitResult<Outcome>>;
}

/// Submitter backed by the request/response channels and a [`Correlator`].
pub struct Submitter {
    transport: Transport,
    correlator: Correlator,
    timeout: Duration,
}

impl Submitter {
    pub fn new(transport: Transport, correlator: Correlator) -> Self {
        Self {
            transport,
            correlator,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_config(self, config: &RelayConfig) -> Self {
        self.with_timeout(config.submitter.timeout)
    }

    async fn run(&self, job: Job) -> SubmitResult<Outcome> {
        // Leftovers from an earlier submission under the same key must not
        // answer this one.
        if self.correlator.discard(&job.key) {
            debug!(key = %job.key, "discarded stale result before submit");
        }

        let upload = self
            .transport
            .blobs
            .put(&self.transport.input_bucket, &job.filename, job.payload.clone());
        let enqueue = self
            .transport
            .queue
            .send(&self.transport.request_queue, &job.filename);
        tokio::try_join!(upload, enqueue)?;
        info!(key = %job.key, bytes = job.payload.len(), "job submitted");

        match self.correlator.wait(&job.key, self.timeout).await {
            WaitOutcome::Ready(outcome) => {
                let waited = job.submitted_at.elapsed().unwrap_or_default();
                info!(key = %outcome.key, value = %outcome.value, ?waited, "job completed");
                Ok(outcome)
            }
            WaitOutcome::Timeout => {
                warn!(key = %job.key, timeout = ?self.timeout, "no result before deadline");
                Ok(Outcome::timeout(job.key))
            }
        }
    }
}

impl Submit for Submitter {
    fn submit<'a>(&'a self, payload: Bytes, filename: &'a str) -> BoxFuture<'a, SubmitResult<Outcome>> {
        Box::pin(async move {
            if filename.is_empty() {
                return Err(SubmitError::MissingFile);
            }
            self.run(Job::new(filename, payload)).await
        })
    }
}

/// Submitter that polls the attribute store for the outcome instead of
/// listening on the response channel.
///
/// The job goes through the request channel like any other; workers
/// configured with the same attribute table record their result there.
pub struct AttributeSubmitter {
    transport: Transport,
    table: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl AttributeSubmitter {
    pub fn new(transport: Transport, table: impl Into<String>) -> Self {
        Self {
            transport,
            table: table.into(),
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_config(self, config: &RelayConfig) -> Self {
        self.with_timing(config.submitter.timeout, config.submitter.poll_interval)
    }

    /// Poll until the attribute appears or the deadline passes.
    async fn poll(&self, key: &str) -> String {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self
                .transport
                .attributes
                .get_attribute(&self.table, key, RECOGNITION_ATTRIBUTE)
                .await
            {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(e) => warn!(%key, table = %self.table, error = %e, "attribute read failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return UNKNOWN_VALUE.to_string();
            }
            tokio::time::sleep_until((now + self.poll_interval).min(deadline)).await;
        }
    }
}

impl Submit for AttributeSubmitter {
    fn submit<'a>(&'a self, payload: Bytes, filename: &'a str) -> BoxFuture<'a, SubmitResult<Outcome>> {
        Box::pin(async move {
            if filename.is_empty() {
                return Err(SubmitError::MissingFile);
            }
            let job = Job::new(filename, payload);

            let upload = self
                .transport
                .blobs
                .put(&self.transport.input_bucket, &job.filename, job.payload.clone());
            let enqueue = self
                .transport
                .queue
                .send(&self.transport.request_queue, &job.filename);
            tokio::try_join!(upload, enqueue)?;
            debug!(key = %job.key, table = %self.table, "job submitted, polling attribute");

            let value = self.poll(&job.key).await;
            info!(key = %job.key, %value, "attribute lookup finished");
            Ok(Outcome::new(job.key, value))
        })
    }
}
