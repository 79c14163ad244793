//! Transport queue: a preallocated ring of reusable slots.
//!
//! One producer and one consumer share a fixed-capacity circular buffer:
//!
//! ```text
//!  Producer::claim() ──► Claim (DerefMut, write slot in place) ──► drop = publish
//!                                                                      │
//!                                                        cursor (Release/Acquire)
//!                                                                      ▼
//!  Consumer::process_batch(|slot, seq, end_of_batch| ..) ──► release batch (gating)
//! ```
//!
//! Sequence `s` lives in slot `s & (capacity - 1)`. The producer blocks in
//! [`Producer::claim`] while the ring is full; the consumer waits according to
//! a pluggable [`WaitStrategy`] while it is empty.
//!
//! ```
//! use std::sync::Arc;
//! use stream_dispatch::ring::{ring_buffer, SleepingWaitStrategy};
//!
//! let (mut producer, mut consumer) =
//!     ring_buffer(4, || 0u32, Arc::new(SleepingWaitStrategy::default())).unwrap();
//!
//! *producer.claim() = 7;
//! *producer.claim() = 8;
//!
//! let mut seen = Vec::new();
//! consumer.process_batch(|slot, _, end_of_batch| seen.push((*slot, end_of_batch)));
//! assert_eq!(seen, vec![(7, false), (8, true)]);
//! ```

mod buffer;
mod sequence;
mod wait_strategy;

pub use buffer::{ring_buffer, Claim, Consumer, Producer};
pub use sequence::{Sequence, INITIAL_CURSOR_VALUE};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    WaitStrategyKind, YieldingWaitStrategy,
};
