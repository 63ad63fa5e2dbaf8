//! Standalone mode — every component in one process.
//!
//! In this mode the daemon:
//! 1. Opens the local transport (memory queue, fs blob store, memory attributes)
//! 2. Starts the response listener feeding the correlator
//! 3. Creates a fleet of worker slots and the controller that scales it
//! 4. Builds the submission router (channel submitter, or attribute lookup
//!    when `submitter.attribute_table` is set; workers then record their
//!    results in that table too)

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use relay_core::{RECOGNITION_ATTRIBUTE, RelayConfig};
use relaygrid_autoscale::FleetController;
use relaygrid_correlator::{AttributeSubmitter, Correlator, ResponseListener, Submit, Submitter};
use relaygrid_queue::{AttributeStore, FsBlobStore, MemoryAttributeStore, MemoryQueue, Transport};
use relaygrid_worker::{Inference, Worker};

use crate::local_fleet::{LocalFleet, WorkerFactory};

/// A running standalone assembly.
pub struct Standalone {
    pub router: Router,
    pub fleet: LocalFleet,
    pub transport: Transport,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Standalone {
    /// Wire everything up and spawn the background loops.
    pub async fn start(
        config: &RelayConfig,
        data_dir: &Path,
        inference: Arc<dyn Inference>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let queue = MemoryQueue::new(config.queues.visibility_timeout);
        let blobs = FsBlobStore::new(data_dir.join("blobs"));
        info!(root = ?blobs.root(), "blob store opened");
        let attributes = MemoryAttributeStore::new();
        let transport = Transport::new(
            config,
            Arc::new(queue),
            Arc::new(blobs),
            Arc::new(attributes),
        );

        if let (Some(table), Some(seed)) = (
            config.submitter.attribute_table.as_deref(),
            config.submitter.attribute_seed.as_deref(),
        ) {
            let count = seed_attributes(transport.attributes.as_ref(), table, seed).await?;
            info!(%table, path = ?seed, count, "attribute table seeded");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // Response listener.
        let correlator = Correlator::new();
        let listener = ResponseListener::new(&transport, correlator.clone()).with_config(config);
        let listener_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            listener.run(listener_shutdown).await;
        }));

        // Worker slots.
        let mut worker_config = config.clone();
        if worker_config.worker.attribute_table.is_none() {
            worker_config.worker.attribute_table = config.submitter.attribute_table.clone();
        }
        let worker_transport = transport.clone();
        let factory: WorkerFactory = Arc::new(move |name: &str| {
            Worker::new(name, worker_transport.clone(), inference.clone()).with_config(&worker_config)
        });
        let fleet = LocalFleet::new(
            &config.controller.tag_prefix,
            config.controller.fleet_size,
            factory,
        );
        info!(slots = config.controller.fleet_size, "worker fleet created");

        // Fleet controller.
        let mut controller = FleetController::new(
            Arc::new(fleet.clone()),
            transport.queue.clone(),
            transport.request_queue.clone(),
            config.controller.clone(),
        );
        let controller_shutdown = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            controller.run(controller_shutdown).await;
        }));

        let submitter: Arc<dyn Submit> = match &config.submitter.attribute_table {
            Some(table) => {
                info!(%table, "serving outcomes from attribute table");
                Arc::new(AttributeSubmitter::new(transport.clone(), table.clone()).with_config(config))
            }
            None => Arc::new(Submitter::new(transport.clone(), correlator).with_config(config)),
        };
        let router = relaygrid_api::build_router(submitter);

        Ok(Self {
            router,
            fleet,
            transport,
            shutdown_tx,
            tasks,
        })
    }

    /// Stop the listener and controller, then drain the workers.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.fleet.shutdown_all().await;
        info!("standalone components stopped");
    }
}

/// Load `item,value` lines into `table`. Blank lines and lines starting
/// with `#` are skipped.
pub async fn seed_attributes(
    store: &dyn AttributeStore,
    table: &str,
    path: &Path,
) -> anyhow::Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;

    let mut count = 0;
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((item, value)) = line.split_once(',') else {
            anyhow::bail!("{}:{}: expected `item,value`", path.display(), lineno + 1);
        };
        store
            .put_attribute(table, item.trim(), RECOGNITION_ATTRIBUTE, value.trim())
            .await?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.csv");
        std::fs::write(&path, "# item,value\ntest_00, Paul\n\ntest_01,Emma\n").unwrap();
        let store = MemoryAttributeStore::new();

        let count = seed_attributes(&store, "results", &path).await.unwrap();

        assert_eq!(count, 2);
        let value = store
            .get_attribute("results", "test_00", RECOGNITION_ATTRIBUTE)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("Paul"));
    }

    #[tokio::test]
    async fn seed_rejects_lines_without_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.csv");
        std::fs::write(&path, "test_00 Paul\n").unwrap();

        let err = seed_attributes(&MemoryAttributeStore::new(), "results", &path)
            .await
            .unwrap_err();

        assert!(err.to_string().contains(":1:"));
    }
}
