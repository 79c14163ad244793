use super::{EngineConfig, ShutdownPolicy, StreamDefinition};
use crate::error::ConfigError;
use crate::ring::WaitStrategyKind;

/// Fully resolved settings for one stream's dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherConfig {
    /// Deliver through the transport queue and a consumer loop.
    pub async_enabled: bool,
    /// Transport queue capacity; a non-zero power of two.
    pub capacity: usize,
    pub wait_strategy: WaitStrategyKind,
    pub shutdown_policy: ShutdownPolicy,
    /// Name of the consumer thread. The default is the bare engine prefix,
    /// which `StreamDispatcher::new` extends with the stream id.
    pub thread_name: String,
}

impl DispatcherConfig {
    /// Resolve the settings for `definition` against engine defaults.
    ///
    /// Fails on a conflicting async declaration or an invalid buffer size, so
    /// a misconfigured stream never becomes active.
    pub fn resolve(
        engine: &EngineConfig,
        definition: &StreamDefinition,
    ) -> Result<Self, ConfigError> {
        engine.validate()?;
        Ok(Self {
            async_enabled: definition.async_enabled()?,
            capacity: engine.event_buffer_size,
            wait_strategy: engine.wait_strategy,
            shutdown_policy: engine.shutdown_policy,
            thread_name: format!("{}-{}", engine.consumer_thread_prefix, definition.id),
        })
    }

    /// Synchronous delivery only.
    pub fn synchronous() -> Self {
        Self {
            async_enabled: false,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
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

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            async_enabled: true,
            capacity: engine.event_buffer_size,
            wait_strategy: engine.wait_strategy,
            shutdown_policy: engine.shutdown_policy,
            thread_name: engine.consumer_thread_prefix,
        }
    }
}
