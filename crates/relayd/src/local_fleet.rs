//! Fleet API backed by in-process worker tasks.
//!
//! Each slot stands in for one tagged compute instance. Starting a slot
//! spawns a [`Worker`] task; stopping it flips that task's shutdown signal,
//! and the slot reports `Stopping` until the current job has drained.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use relay_core::BoxFuture;
use relaygrid_autoscale::{FleetApi, FleetError, FleetResult, Instance, InstanceState};
use relaygrid_worker::Worker;

/// Builds the worker for a slot, given the slot name.
pub type WorkerFactory = Arc<dyn Fn(&str) -> Worker + Send + Sync>;

struct WorkerTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    stopping: bool,
}

struct Slot {
    id: String,
    name: String,
    task: Option<WorkerTask>,
}

impl Slot {
    fn state(&mut self) -> InstanceState {
        if self.task.as_ref().is_some_and(|t| t.handle.is_finished()) {
            self.task = None;
        }
        match &self.task {
            None => InstanceState::Stopped,
            Some(t) if t.stopping => InstanceState::Stopping,
            Some(_) => InstanceState::Running,
        }
    }
}

/// Fixed set of worker slots, all stopped at creation.
#[derive(Clone)]
pub struct LocalFleet {
    slots: Arc<Mutex<Vec<Slot>>>,
    factory: WorkerFactory,
}

impl LocalFleet {
    pub fn new(tag_prefix: &str, size: usize, factory: WorkerFactory) -> Self {
        let slots = (0..size)
            .map(|n| Slot {
                id: format!("i-{n:04}"),
                name: format!("{tag_prefix}{n}"),
                task: None,
            })
            .collect();
        Self {
            slots: Arc::new(Mutex::new(slots)),
            factory,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn count(&self, state: InstanceState) -> usize {
        self.lock().iter_mut().map(|s| s.state()).filter(|st| *st == state).count()
    }

    fn check_known(slots: &[Slot], ids: &[String]) -> FleetResult<()> {
        match ids.iter().find(|id| !slots.iter().any(|s| &s.id == *id)) {
            Some(missing) => Err(FleetError::UnknownInstance(missing.clone())),
            None => Ok(()),
        }
    }

    /// Signal every worker and wait for all of them to finish their
    /// current job.
    pub async fn shutdown_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut slots = self.lock();
            slots
                .iter_mut()
                .filter_map(|slot| slot.task.take())
                .map(|task| {
                    let _ = task.shutdown.send(true);
                    task.handle
                })
                .collect()
        };
        info!(workers = handles.len(), "draining workers");
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl FleetApi for LocalFleet {
    fn list_instances<'a>(&'a self, tag_prefix: &'a str) -> BoxFuture<'a, FleetResult<Vec<Instance>>> {
        Box::pin(async move {
            let mut slots = self.lock();
            Ok(slots
                .iter_mut()
                .filter(|s| s.name.starts_with(tag_prefix))
                .map(|s| Instance {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    state: s.state(),
                })
                .collect())
        })
    }

    fn start<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>> {
        Box::pin(async move {
            let mut slots = self.lock();
            Self::check_known(&slots, ids)?;
            for slot in slots.iter_mut().filter(|s| ids.contains(&s.id)) {
                if slot.state() != InstanceState::Stopped {
                    debug!(id = %slot.id, "start ignored, slot busy");
                    continue;
                }
                let worker = (self.factory)(&slot.name);
                let (shutdown, rx) = watch::channel(false);
                let handle = tokio::spawn(async move { worker.run(rx).await });
                slot.task = Some(WorkerTask {
                    shutdown,
                    handle,
                    stopping: false,
                });
                info!(id = %slot.id, name = %slot.name, "worker started");
            }
            Ok(())
        })
    }

    fn stop<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>> {
        Box::pin(async move {
            let mut slots = self.lock();
            Self::check_known(&slots, ids)?;
            for slot in slots.iter_mut().filter(|s| ids.contains(&s.id)) {
                if let Some(task) = slot.task.as_mut() {
                    let _ = task.shutdown.send(true);
                    task.stopping = true;
                    info!(id = %slot.id, name = %slot.name, "worker stopping");
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use relay_core::RelayConfig;
    use relaygrid_queue::{MemoryAttributeStore, MemoryBlobStore, MemoryQueue, Transport};
    use relaygrid_worker::Inference;

    use super::*;

    struct Noop;

    impl Inference for Noop {
        fn infer<'a>(&'a self, _input: &'a Path) -> BoxFuture<'a, anyhow::Result<String>> {
            Box::pin(async { Ok("Nobody".to_string()) })
        }
    }

    fn fleet(size: usize) -> LocalFleet {
        let transport = Transport::new(
            &RelayConfig::default(),
            Arc::new(MemoryQueue::new(Duration::from_secs(30))),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryAttributeStore::new()),
        );
        let factory: WorkerFactory = Arc::new(move |name: &str| {
            Worker::new(name, transport.clone(), Arc::new(Noop))
        });
        LocalFleet::new("app-tier-instance-", size, factory)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn slots_start_stopped_and_are_tagged() {
        let fleet = fleet(3);
        let listed = fleet.list_instances("app-tier-instance-").await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[2].name, "app-tier-instance-2");
        assert!(listed.iter().all(|i| i.state == InstanceState::Stopped));
        assert!(fleet.list_instances("web-").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_spawns_and_stop_drains() {
        let fleet = fleet(3);
        fleet.start(&ids(&["i-0000", "i-0002"])).await.unwrap();
        assert_eq!(fleet.count(InstanceState::Running), 2);

        fleet.stop(&ids(&["i-0000"])).await.unwrap();
        // The idle worker notices the signal promptly.
        tokio::time::timeout(Duration::from_secs(5), async {
            while fleet.count(InstanceState::Stopped) != 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker did not stop");
        assert_eq!(fleet.count(InstanceState::Running), 1);

        fleet.shutdown_all().await;
        assert_eq!(fleet.count(InstanceState::Stopped), 3);
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let fleet = fleet(1);
        let err = fleet.start(&ids(&["i-0042"])).await.unwrap_err();
        assert!(matches!(err, FleetError::UnknownInstance(id) if id == "i-0042"));
        assert_eq!(fleet.count(InstanceState::Running), 0);
    }

    #[tokio::test]
    async fn starting_a_running_slot_is_a_no_op() {
        let fleet = fleet(1);
        fleet.start(&ids(&["i-0000"])).await.unwrap();
        fleet.start(&ids(&["i-0000"])).await.unwrap();
        assert_eq!(fleet.count(InstanceState::Running), 1);
        fleet.shutdown_all().await;
    }
}
