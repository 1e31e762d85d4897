//! Executor and lock configuration.

use partmix_audio::{AdapterConfig, MixerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Track lock polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Delay between checks while another task holds the lock.
    pub poll_interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for [`crate::TaskExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of worker threads; tasks beyond this queue up.
    pub worker_threads: usize,
    pub lock: LockConfig,
    pub mixer: MixerConfig,
    pub adapter: AdapterConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            lock: LockConfig::default(),
            mixer: MixerConfig::default(),
            adapter: AdapterConfig::default(),
        }
    }
}
