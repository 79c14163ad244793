use crate::error::DispatchError;
use crate::event::{Event, StreamEvent};

/// Entry points used by upstream query evaluation to hand over results.
///
/// Only one thread may call into a given receiver at a time.
pub trait Receiver: Send + Sync {
    fn stream_id(&self) -> &str;

    /// Walk a chain of results, delivering each link in order.
    fn receive_stream_event(&self, event: &StreamEvent) -> Result<(), DispatchError>;

    fn receive_event(&self, event: &Event) -> Result<(), DispatchError>;

    /// Accumulate `event`; the accumulated run is delivered as one batch when
    /// `end_of_batch` is set.
    fn receive_batched(&self, event: Event, end_of_batch: bool) -> Result<(), DispatchError>;
}
