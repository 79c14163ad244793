//! Stream dispatcher integration tests.
//!
//! Covers both delivery modes of `StreamDispatcher`:
//! - Inline delivery before start and for streams declared `async = 'false'`
//! - Queued delivery through the ring and a named consumer thread
//! - Start/stop transitions and the drain and discard shutdown policies
//! - Settings resolved from engine config and stream annotations

mod lifecycle;
mod synchronous;
