//! Shared handles to the transport collaborators.

use std::sync::Arc;

use relay_core::RelayConfig;

use crate::{AttributeStore, BlobStore, MessageQueue};

/// Queue, blob, and attribute handles plus the channel and bucket names the
/// components agree on. Built once at startup and cloned into each
/// component; there are no process-wide clients.
#[derive(Clone)]
pub struct Transport {
    pub queue: Arc<dyn MessageQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub attributes: Arc<dyn AttributeStore>,
    pub request_queue: String,
    pub response_queue: String,
    pub input_bucket: String,
    pub output_bucket: String,
}

impl Transport {
    pub fn new(
        config: &RelayConfig,
        queue: Arc<dyn MessageQueue>,
        blobs: Arc<dyn BlobStore>,
        attributes: Arc<dyn AttributeStore>,
    ) -> Self {
        Self {
            queue,
            blobs,
            attributes,
            request_queue: config.queues.request.clone(),
            response_queue: config.queues.response.clone(),
            input_bucket: config.buckets.input.clone(),
            output_bucket: config.buckets.output.clone(),
        }
    }
}
