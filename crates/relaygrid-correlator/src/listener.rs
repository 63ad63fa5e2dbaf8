//! Response listener — drains the response channel into the correlator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_core::{Outcome, RelayConfig};
use relaygrid_queue::{MessageQueue, ReceivedMessage, Transport, TransportResult};

use crate::correlator::Correlator;

/// Background task feeding results from the response channel into a
/// [`Correlator`].
///
/// Messages are deleted only after their result is in the table. Bodies
/// that do not parse are logged and deleted anyway; their submitter simply
/// times out.
pub struct ResponseListener {
    queue: Arc<dyn MessageQueue>,
    channel: String,
    correlator: Correlator,
    batch_size: usize,
    wait: Duration,
    error_backoff: Duration,
}

impl ResponseListener {
    pub fn new(transport: &Transport, correlator: Correlator) -> Self {
        Self {
            queue: transport.queue.clone(),
            channel: transport.response_queue.clone(),
            correlator,
            batch_size: 10,
            wait: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
        }
    }

    /// Apply the `[listener]` section of the config.
    pub fn with_config(mut self, config: &RelayConfig) -> Self {
        self.batch_size = config.listener.batch_size;
        self.wait = config.listener.wait;
        self.error_backoff = config.listener.error_backoff;
        self
    }

    /// Receive one batch and process it. Returns the number of results
    /// inserted into the correlator.
    pub async fn poll_once(&self) -> TransportResult<usize> {
        let batch = self
            .queue
            .receive(&self.channel, self.batch_size, self.wait)
            .await?;
        Ok(self.handle_batch(batch).await)
    }

    async fn handle_batch(&self, batch: Vec<ReceivedMessage>) -> usize {
        let mut inserted = 0;
        for message in batch {
            match message.body.parse::<Outcome>() {
                Ok(outcome) => {
                    debug!(key = %outcome.key, value = %outcome.value, "result received");
                    self.correlator.insert(outcome);
                    inserted += 1;
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "dropping malformed result message");
                }
            }

            if let Err(e) = self
                .queue
                .delete(&self.channel, &message.receipt_handle)
                .await
            {
                warn!(channel = %self.channel, error = %e, "failed to delete result message");
            }
        }
        inserted
    }

    /// Run until the shutdown signal flips.
    ///
    /// Shutdown abandons a pending long-poll, but a batch that was already
    /// received is fully processed first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel, "response listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                res = self.queue.receive(&self.channel, self.batch_size, self.wait) => res,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok(batch) => {
                    self.handle_batch(batch).await;
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "response poll failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.error_backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!("response listener shutting down");
    }
}
