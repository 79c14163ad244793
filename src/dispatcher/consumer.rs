use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::callback::SinkHandle;
use crate::event::{Event, Value};
use crate::ring::Consumer;

/// Counters collected by a consumer loop over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to the sink (including those in failed batches).
    pub events_delivered: usize,
    /// Batch calls made on the sink.
    pub batches_delivered: usize,
    /// Events drained after the sink was detached.
    pub events_discarded: usize,
    /// Batch calls that returned an error or panicked.
    pub sink_failures: usize,
    /// Times the loop found the queue empty and had to wait.
    pub idle_polls: usize,
}

/// A queue slot: either an event or the terminal marker published by `stop()`.
pub(crate) struct Slot {
    halt: bool,
    event: Event,
}

impl Slot {
    pub(crate) fn with_arity(arity: usize) -> Self {
        Self {
            halt: false,
            event: Event::with_arity(arity),
        }
    }

    pub(crate) fn load(&mut self, timestamp: i64, values: &[Value]) {
        self.halt = false;
        self.event.copy_from(timestamp, values);
    }

    pub(crate) fn halt(&mut self) {
        self.halt = true;
    }
}

/// Reusable accumulation buffer; events are overwritten, not reallocated.
struct BatchBuffer {
    events: Vec<Event>,
    len: usize,
}

impl BatchBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    fn push(&mut self, event: &Event) {
        match self.events.get_mut(self.len) {
            Some(slot) => slot.copy_from(event.timestamp, &event.values),
            None => self.events.push(event.clone()),
        }
        self.len += 1;
    }

    fn as_slice(&self) -> &[Event] {
        &self.events[..self.len]
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Drains one stream's queue on a dedicated thread.
pub(crate) struct ConsumerLoop {
    stream_id: String,
    consumer: Consumer<Slot>,
    sink: Arc<SinkHandle>,
}

impl ConsumerLoop {
    pub(crate) fn new(stream_id: String, consumer: Consumer<Slot>, sink: Arc<SinkHandle>) -> Self {
        Self {
            stream_id,
            consumer,
            sink,
        }
    }

    /// Deliver every batch until the halt slot is drained.
    ///
    /// A batch is whatever was published when the loop looked; it is flushed
    /// to the sink at its last slot.
    pub(crate) fn run(mut self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let mut batch = BatchBuffer::with_capacity(self.consumer.capacity());
        let mut halted = false;
        let mut idle_polls = 0;

        while !halted {
            let stream_id = self.stream_id.as_str();
            let sink = &self.sink;
            let mut on_slot = |slot: &Slot, _sequence: i64, end_of_batch: bool| {
                if slot.halt {
                    halted = true;
                } else {
                    batch.push(&slot.event);
                }
                if end_of_batch {
                    flush(stream_id, sink, &mut batch, &mut stats);
                }
            };

            if self.consumer.try_process_batch(&mut on_slot) == 0 {
                idle_polls += 1;
                self.consumer.process_batch(&mut on_slot);
            }
        }

        stats.idle_polls = idle_polls;
        stats
    }
}

/// Log-and-continue: a failing sink loses the batch but not the stream.
fn flush(stream_id: &str, sink: &SinkHandle, batch: &mut BatchBuffer, stats: &mut DispatchStats) {
    if batch.is_empty() {
        return;
    }
    let events = batch.as_slice();
    let count = events.len();

    match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(events))) {
        Ok(Ok(true)) => {
            stats.events_delivered += count;
            stats.batches_delivered += 1;
        }
        Ok(Ok(false)) => stats.events_discarded += count,
        Ok(Err(e)) => {
            stats.events_delivered += count;
            stats.batches_delivered += 1;
            stats.sink_failures += 1;
            error!(stream_id, events = count, error = %e, "sink failed to handle batch");
        }
        Err(payload) => {
            stats.events_delivered += count;
            stats.batches_delivered += 1;
            stats.sink_failures += 1;
            error!(
                stream_id,
                events = count,
                panic = panic_message(payload.as_ref()),
                "sink panicked while handling batch"
            );
        }
    }

    batch.clear();
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
