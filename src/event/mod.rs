//! Event model: the records that flow from query evaluation to a sink.
//!
//! An [`Event`] is a timestamp plus an ordered row of typed [`Value`]s, sized
//! to the attribute count of the stream that produced it. Inside the transport
//! queue the same `Event` records are reused for every publish: the producer
//! overwrites timestamp and values in place via [`Event::copy_from`] rather
//! than allocating a fresh record.
//!
//! Upstream evaluation hands results over as a linked chain of
//! [`StreamEvent`]s; the dispatcher walks that chain in order.

mod stream_event;
mod value;

pub use stream_event::{StreamEvent, StreamEventIter};
pub use value::Value;

use serde::{Deserialize, Serialize};

/// A single result event: timestamp and attribute values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: i64,
    pub values: Vec<Value>,
}

impl Event {
    pub fn new(timestamp: i64, values: Vec<Value>) -> Self {
        Self { timestamp, values }
    }

    /// Blank record with `arity` null values, used to preallocate queue slots.
    pub fn with_arity(arity: usize) -> Self {
        Self {
            timestamp: 0,
            values: vec![Value::Null; arity],
        }
    }

    /// Overwrite this record in place from borrowed parts.
    ///
    /// The existing value vector is reused, so a slot that already has room
    /// for the row does not reallocate.
    pub fn copy_from(&mut self, timestamp: i64, values: &[Value]) {
        self.timestamp = timestamp;
        self.values.truncate(values.len());
        let (head, tail) = values.split_at(self.values.len());
        self.values.clone_from_slice(head);
        self.values.extend_from_slice(tail);
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

impl From<&StreamEvent> for Event {
    fn from(event: &StreamEvent) -> Self {
        event.to_event()
    }
}
