//! Instance fleet API and the snapshot the controller decides on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use relay_core::BoxFuture;

use crate::error::{FleetError, FleetResult};

/// Lifecycle state of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A tagged compute instance as reported by the fleet API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    /// Value of the naming tag, e.g. `app-tier-instance-3`.
    pub name: String,
    pub state: InstanceState,
}

/// Compute-instance lifecycle API.
pub trait FleetApi: Send + Sync {
    /// Instances whose name starts with `tag_prefix`, in a stable order.
    fn list_instances<'a>(&'a self, tag_prefix: &'a str) -> BoxFuture<'a, FleetResult<Vec<Instance>>>;

    fn start<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>>;

    fn stop<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>>;
}

/// Running and stopped instance ids, in listing order. Instances in
/// transitional states are in neither set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    pub running: Vec<String>,
    pub stopped: Vec<String>,
}

impl FleetSnapshot {
    pub fn from_instances(instances: &[Instance]) -> Self {
        let mut snapshot = Self::default();
        for inst in instances {
            match inst.state {
                InstanceState::Running => snapshot.running.push(inst.id.clone()),
                InstanceState::Stopped => snapshot.stopped.push(inst.id.clone()),
                InstanceState::Pending | InstanceState::Stopping => {}
            }
        }
        snapshot
    }
}

/// Fleet API fake that flips instance states immediately and records every
/// start/stop call (for testing).
#[derive(Clone, Default)]
pub struct MemoryFleet {
    instances: Arc<Mutex<Vec<Instance>>>,
    start_calls: Arc<Mutex<Vec<Vec<String>>>>,
    stop_calls: Arc<Mutex<Vec<Vec<String>>>>,
    unavailable: Arc<AtomicBool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryFleet {
    /// A fleet with `running` running and `stopped` stopped instances named
    /// `{prefix}{n}`, running ones first.
    pub fn with_instances(prefix: &str, running: usize, stopped: usize) -> Self {
        let fleet = Self::default();
        {
            let mut instances = lock(&fleet.instances);
            for n in 0..running + stopped {
                let state = if n < running {
                    InstanceState::Running
                } else {
                    InstanceState::Stopped
                };
                instances.push(Instance {
                    id: format!("i-{n:04}"),
                    name: format!("{prefix}{n}"),
                    state,
                });
            }
        }
        fleet
    }

    pub fn add(&self, instance: Instance) {
        lock(&self.instances).push(instance);
    }

    /// Make every call fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> Vec<Vec<String>> {
        lock(&self.start_calls).clone()
    }

    pub fn stop_calls(&self) -> Vec<Vec<String>> {
        lock(&self.stop_calls).clone()
    }

    pub fn count(&self, state: InstanceState) -> usize {
        lock(&self.instances)
            .iter()
            .filter(|i| i.state == state)
            .count()
    }

    fn check_available(&self) -> FleetResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FleetError::Unavailable("memory fleet marked unavailable".into()));
        }
        Ok(())
    }

    fn transition(&self, ids: &[String], to: InstanceState) -> FleetResult<()> {
        self.check_available()?;
        let mut instances = lock(&self.instances);
        if let Some(missing) = ids.iter().find(|id| !instances.iter().any(|i| &i.id == *id)) {
            return Err(FleetError::UnknownInstance(missing.clone()));
        }
        for inst in instances.iter_mut().filter(|i| ids.contains(&i.id)) {
            debug!(id = %inst.id, from = %inst.state, to = %to, "instance transition");
            inst.state = to;
        }
        Ok(())
    }
}

impl FleetApi for MemoryFleet {
    fn list_instances<'a>(&'a self, tag_prefix: &'a str) -> BoxFuture<'a, FleetResult<Vec<Instance>>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(lock(&self.instances)
                .iter()
                .filter(|i| i.name.starts_with(tag_prefix))
                .cloned()
                .collect())
        })
    }

    fn start<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>> {
        Box::pin(async move {
            self.transition(ids, InstanceState::Running)?;
            lock(&self.start_calls).push(ids.to_vec());
            Ok(())
        })
    }

    fn stop<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, FleetResult<()>> {
        Box::pin(async move {
            self.transition(ids, InstanceState::Stopped)?;
            lock(&self.stop_calls).push(ids.to_vec());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_skips_transitional_states() {
        let instances = vec![
            Instance { id: "i-1".into(), name: "w-1".into(), state: InstanceState::Running },
            Instance { id: "i-2".into(), name: "w-2".into(), state: InstanceState::Stopping },
            Instance { id: "i-3".into(), name: "w-3".into(), state: InstanceState::Stopped },
            Instance { id: "i-4".into(), name: "w-4".into(), state: InstanceState::Pending },
        ];
        let snapshot = FleetSnapshot::from_instances(&instances);
        assert_eq!(snapshot.running, vec!["i-1"]);
        assert_eq!(snapshot.stopped, vec!["i-3"]);
    }

    #[tokio::test]
    async fn list_filters_by_tag_prefix() {
        let fleet = MemoryFleet::with_instances("app-tier-instance-", 1, 1);
        fleet.add(Instance {
            id: "i-web".into(),
            name: "web-tier".into(),
            state: InstanceState::Running,
        });
        let listed = fleet.list_instances("app-tier-instance-").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|i| i.name.starts_with("app-tier-instance-")));
    }

    #[tokio::test]
    async fn start_and_stop_flip_state_and_record_calls() {
        let fleet = MemoryFleet::with_instances("w-", 1, 2);
        let ids = vec!["i-0001".to_string(), "i-0002".to_string()];
        fleet.start(&ids).await.unwrap();
        assert_eq!(fleet.count(InstanceState::Running), 3);

        fleet.stop(&ids[..1]).await.unwrap();
        assert_eq!(fleet.count(InstanceState::Stopped), 1);
        assert_eq!(fleet.start_calls(), vec![ids.clone()]);
        assert_eq!(fleet.stop_calls(), vec![vec!["i-0001".to_string()]]);
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let fleet = MemoryFleet::with_instances("w-", 1, 0);
        let err = fleet.start(&["i-9999".to_string()]).await.unwrap_err();
        assert!(matches!(err, FleetError::UnknownInstance(id) if id == "i-9999"));
        assert!(fleet.start_calls().is_empty());
    }

    #[tokio::test]
    async fn unavailable_fleet_fails_every_call() {
        let fleet = MemoryFleet::with_instances("w-", 1, 0);
        fleet.set_unavailable(true);
        assert!(fleet.list_instances("w-").await.is_err());
        fleet.set_unavailable(false);
        assert!(fleet.list_instances("w-").await.is_ok());
    }
}
