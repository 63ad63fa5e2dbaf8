//! The worker loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_core::{Outcome, RECOGNITION_ATTRIBUTE, RelayConfig, correlation_key};
use relaygrid_queue::{ReceivedMessage, Transport};

use crate::error::{WorkerError, WorkerResult};
use crate::inference::Inference;

/// Processes one job per iteration from the request channel.
pub struct Worker {
    id: String,
    transport: Transport,
    inference: Arc<dyn Inference>,
    receive_wait: Duration,
    idle_sleep: Duration,
    scratch_dir: PathBuf,
    attribute_table: Option<String>,
}

impl Worker {
    pub fn new(id: impl Into<String>, transport: Transport, inference: Arc<dyn Inference>) -> Self {
        Self {
            id: id.into(),
            transport,
            inference,
            receive_wait: Duration::from_secs(10),
            idle_sleep: Duration::from_secs(1),
            scratch_dir: std::env::temp_dir().join("relaygrid"),
            attribute_table: None,
        }
    }

    /// Apply the `[worker]` section of the config.
    pub fn with_config(mut self, config: &RelayConfig) -> Self {
        self.receive_wait = config.worker.receive_wait;
        self.idle_sleep = config.worker.idle_sleep;
        self.scratch_dir = config.worker.scratch_dir.clone();
        self.attribute_table = config.worker.attribute_table.clone();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_attribute_table(mut self, table: impl Into<String>) -> Self {
        self.attribute_table = Some(table.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn receive(&self) -> WorkerResult<Option<ReceivedMessage>> {
        let mut batch = self
            .transport
            .queue
            .receive(&self.transport.request_queue, 1, self.receive_wait)
            .await?;
        Ok(batch.pop())
    }

    /// Receive at most one job and process it. `Ok(None)` means the request
    /// channel was empty for the whole long-poll.
    pub async fn process_next(&self) -> WorkerResult<Option<Outcome>> {
        match self.receive().await? {
            Some(message) => self.process(message).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run the job to completion. The request message is deleted only if
    /// every step succeeded.
    async fn process(&self, message: ReceivedMessage) -> WorkerResult<Outcome> {
        let filename = message.body.as_str();
        validate_filename(filename)?;
        let key = correlation_key(filename);
        debug!(worker = %self.id, %filename, "job received");

        let input = self
            .transport
            .blobs
            .get(&self.transport.input_bucket, filename)
            .await?;
        let value = self.infer(filename, input).await?;
        let outcome = Outcome::new(key, value);

        self.transport
            .blobs
            .put(
                &self.transport.output_bucket,
                &outcome.key,
                Bytes::from(outcome.value.clone()),
            )
            .await?;

        if let Some(table) = &self.attribute_table {
            self.transport
                .attributes
                .put_attribute(table, &outcome.key, RECOGNITION_ATTRIBUTE, &outcome.value)
                .await?;
        }

        self.transport
            .queue
            .send(&self.transport.response_queue, &outcome.to_string())
            .await?;
        self.transport
            .queue
            .delete(&self.transport.request_queue, &message.receipt_handle)
            .await?;

        info!(worker = %self.id, key = %outcome.key, value = %outcome.value, "job done");
        Ok(outcome)
    }

    /// Stage the input in scratch space, run inference, and clean up.
    async fn infer(&self, filename: &str, input: Bytes) -> WorkerResult<String> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let path = self.scratch_dir.join(format!("{}-{filename}", self.id));
        tokio::fs::write(&path, &input).await?;

        let result = self.inference.infer(&path).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(worker = %self.id, path = %path.display(), error = %e, "failed to remove scratch file");
        }
        result.map_err(|e| WorkerError::Inference(format!("{e:#}")))
    }

    /// Run until the shutdown signal flips.
    ///
    /// The signal is honored between jobs and while waiting for one; a job
    /// that has been received always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %self.id, channel = %self.transport.request_queue, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                res = self.receive() => res,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok(Some(message)) => {
                    if let Err(e) = self.process(message).await {
                        warn!(worker = %self.id, error = %e, "job failed, leaving it for redelivery");
                    }
                }
                Ok(None) => debug!(worker = %self.id, "no work"),
                Err(e) => warn!(worker = %self.id, error = %e, "request poll failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.idle_sleep) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        info!(worker = %self.id, "worker stopped");
    }
}

/// The request body names a blob in the input bucket and a scratch file, so
/// it must be a single plain path component.
fn validate_filename(filename: &str) -> WorkerResult<()> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(WorkerError::InvalidJob(filename.to_string()));
    }
    Ok(())
}
