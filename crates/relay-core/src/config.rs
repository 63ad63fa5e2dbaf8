//! relay.toml configuration parser.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working standalone configuration. Durations are written as
//! strings with a unit suffix: `"200ms"`, `"10s"`, `"2m"`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub queues: QueuesConfig,
    pub buckets: BucketsConfig,
    pub submitter: SubmitterConfig,
    pub listener: ListenerConfig,
    pub controller: ControllerConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub request: String,
    pub response: String,
    #[serde(with = "duration_str")]
    pub visibility_timeout: Duration,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            request: "req-queue".to_string(),
            response: "resp-queue".to_string(),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketsConfig {
    pub input: String,
    pub output: String,
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            input: "in-bucket".to_string(),
            output: "out-bucket".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    /// How long a caller waits for its result.
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// When set, the API reads outcomes from this attribute table instead
    /// of the response channel.
    pub attribute_table: Option<String>,
    /// `item,value` lines loaded into the attribute table at startup.
    pub attribute_seed: Option<PathBuf>,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            attribute_table: None,
            attribute_seed: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub batch_size: usize,
    #[serde(with = "duration_str")]
    pub wait: Duration,
    #[serde(with = "duration_str")]
    pub error_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Upper bound on running instances.
    pub max_fleet: usize,
    /// Consecutive idle cycles required before scaling down.
    pub idle_threshold: u32,
    /// Instances whose name starts with this prefix belong to the fleet.
    pub tag_prefix: String,
    /// Base sleep when the request channel is empty.
    #[serde(with = "duration_str")]
    pub idle_interval: Duration,
    /// Base sleep while there is backlog.
    #[serde(with = "duration_str")]
    pub busy_interval: Duration,
    /// Upper bound of the uniform jitter added to every sleep.
    #[serde(with = "duration_str")]
    pub jitter: Duration,
    #[serde(with = "duration_str")]
    pub error_backoff: Duration,
    /// Number of worker slots created by the standalone daemon.
    pub fleet_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_fleet: 15,
            idle_threshold: 2,
            tag_prefix: "app-tier-instance-".to_string(),
            idle_interval: Duration::from_secs(1),
            busy_interval: Duration::from_millis(200),
            jitter: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            fleet_size: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    #[serde(with = "duration_str")]
    pub receive_wait: Duration,
    /// Pause between iterations.
    #[serde(with = "duration_str")]
    pub idle_sleep: Duration,
    /// Scratch directory for downloaded inputs.
    pub scratch_dir: PathBuf,
    /// External inference program and its leading arguments. The local
    /// input path is appended as the last argument.
    pub inference_command: Vec<String>,
    /// When set, outcomes are also recorded in this attribute table.
    pub attribute_table: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            receive_wait: Duration::from_secs(10),
            idle_sleep: Duration::from_secs(1),
            scratch_dir: std::env::temp_dir().join("relaygrid"),
            inference_command: Vec::new(),
            attribute_table: None,
        }
    }
}

impl RelayConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the control loops cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queues.request == self.queues.response {
            anyhow::bail!("request and response queues must differ");
        }
        if self.listener.batch_size == 0 {
            anyhow::bail!("listener.batch_size must be at least 1");
        }
        if self.controller.idle_threshold == 0 {
            anyhow::bail!("controller.idle_threshold must be at least 1");
        }
        if self.submitter.attribute_seed.is_some() && self.submitter.attribute_table.is_none() {
            anyhow::bail!("submitter.attribute_seed requires submitter.attribute_table");
        }
        if self.controller.fleet_size > self.controller.max_fleet {
            anyhow::bail!(
                "controller.fleet_size ({}) exceeds controller.max_fleet ({})",
                self.controller.fleet_size,
                self.controller.max_fleet
            );
        }
        Ok(())
    }
}

/// Parse a duration string like `"200ms"`, `"30s"`, `"5m"`. A bare number
/// is taken as seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let number = |n: &str| {
        n.trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("invalid duration {s:?}: {e}"))
    };
    if let Some(ms) = s.strip_suffix("ms") {
        number(ms).map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        number(secs).map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let secs = number(mins)?
            .checked_mul(60)
            .ok_or_else(|| anyhow::anyhow!("invalid duration {s:?}: too large"))?;
        Ok(Duration::from_secs(secs))
    } else {
        number(s).map(Duration::from_secs)
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
