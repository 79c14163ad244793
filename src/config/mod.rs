//! Configuration: engine defaults, stream definitions, resolved settings.
//!
//! A stream's delivery mode is declared on its definition
//! (`@config(async = 'false')`) and its queue capacity comes from the engine.
//! Both are folded into a [`DispatcherConfig`] once, when the stream is wired
//! up; the dispatcher itself never looks at annotations.
//!
//! ```
//! use stream_dispatch::config::{Annotation, AttributeType, DispatcherConfig, EngineConfig, StreamDefinition};
//!
//! let definition = StreamDefinition::new("HighPrices")
//!     .attribute("symbol", AttributeType::String)
//!     .attribute("price", AttributeType::Double)
//!     .annotation(Annotation::new("config").element("async", "true"));
//!
//! let config = DispatcherConfig::resolve(&EngineConfig::default(), &definition).unwrap();
//! assert!(config.async_enabled);
//! assert_eq!(config.capacity, 1024);
//! ```

mod definition;
mod dispatcher;
mod engine;

pub use definition::{
    Annotation, Attribute, AttributeType, Element, StreamDefinition, ANNOTATION_CONFIG,
    ELEMENT_ASYNC,
};
pub use dispatcher::DispatcherConfig;
pub use engine::{EngineConfig, ShutdownPolicy, DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_THREAD_PREFIX};
