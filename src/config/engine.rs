use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ring::WaitStrategyKind;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_THREAD_PREFIX: &str = "stream-dispatch";

/// What `stop()` does with events that are published but not yet delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Deliver everything published before `stop()`, then detach the sink.
    #[default]
    Drain,
    /// Detach the sink first; queued events drain as no-ops.
    Discard,
}

/// Engine-wide settings shared by every stream's dispatcher.
///
/// Every field has a default, so a partial document is enough:
///
/// ```
/// use stream_dispatch::{EngineConfig, ShutdownPolicy};
///
/// let config = EngineConfig::from_json_str(r#"{ "event_buffer_size": 256 }"#).unwrap();
/// assert_eq!(config.event_buffer_size, 256);
/// assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transport queue capacity for each asynchronous stream.
    pub event_buffer_size: usize,
    pub wait_strategy: WaitStrategyKind,
    pub shutdown_policy: ShutdownPolicy,
    /// Consumer threads are named `<prefix>-<stream id>`.
    pub consumer_thread_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            wait_strategy: WaitStrategyKind::default(),
            shutdown_policy: ShutdownPolicy::default(),
            consumer_thread_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.event_buffer_size.is_power_of_two() {
            return Err(ConfigError::InvalidCapacity(self.event_buffer_size));
        }
        Ok(())
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_wait_strategy(mut self, kind: WaitStrategyKind) -> Self {
        self.wait_strategy = kind;
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }
}
