pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod executor;
pub mod ring;

pub use config::{DispatcherConfig, EngineConfig, ShutdownPolicy, StreamDefinition};
pub use dispatcher::{
    callback_fn, DispatchStats, FnCallback, Receiver, StreamCallback, StreamDispatcher,
};
pub use error::{ConfigError, DispatchError, SinkError};
pub use event::{Event, StreamEvent, Value};
pub use executor::{Executor, ThreadExecutor};
pub use ring::WaitStrategyKind;
