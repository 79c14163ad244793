//! Stream dispatcher: hands query results to a stream's sink.
//!
//! ## Architecture
//!
//! ```text
//!  upstream evaluation
//!        │  receive_event / receive_values / receive_events
//!        │  receive_batched / receive_stream_event
//!        ▼
//! ┌──────────────────────┐   not started / async off   ┌──────────────────┐
//! │   StreamDispatcher   │ ──────────────────────────► │  StreamCallback  │
//! │  (mode selection)    │                             │  receive(&[..])  │
//! └──────────────────────┘                             └──────────────────┘
//!        │ started async                                        ▲
//!        ▼                                                      │
//! ┌──────────────────────┐   process_batch    ┌──────────────────────────┐
//! │ ring (claim/publish) │ ─────────────────► │ consumer loop (own thread│
//! └──────────────────────┘                    │ batch = what's available)│
//!                                             └──────────────────────────┘
//! ```
//!
//! ## Shutdown
//!
//! `stop()` publishes a halt slot behind every pending event and waits for
//! the consumer loop to reach it. Under [`ShutdownPolicy::Drain`] the sink
//! sees everything published before `stop()`; under
//! [`ShutdownPolicy::Discard`] it is detached first and the remainder drains
//! as no-ops. Either way the sink is never called after `stop()` returns.
//!
//! ## Sink failures
//!
//! In synchronous mode a sink error is returned to the caller. In the
//! consumer loop errors and panics are logged and counted in
//! [`DispatchStats::sink_failures`]; the failed batch is lost and delivery
//! carries on with the next one.
//!
//! [`ShutdownPolicy::Drain`]: crate::config::ShutdownPolicy::Drain
//! [`ShutdownPolicy::Discard`]: crate::config::ShutdownPolicy::Discard

mod callback;
mod consumer;
mod receiver;
mod stream_dispatcher;

pub use callback::{callback_fn, FnCallback, StreamCallback};
pub use consumer::DispatchStats;
pub use receiver::Receiver;
pub use stream_dispatcher::StreamDispatcher;
