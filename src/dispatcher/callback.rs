use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::SinkError;
use crate::event::Event;

/// The downstream sink of a stream: receives ordered, non-empty batches.
///
/// The slice is only borrowed for the duration of the call. In asynchronous
/// mode the events live in buffers that are overwritten by later batches, so
/// a sink that needs to keep an event must clone it.
///
/// A sink must not receive into the dispatcher that calls it. It may stop
/// that dispatcher or drop it; see [`StreamDispatcher`](super::StreamDispatcher)
/// for what such a stop does.
pub trait StreamCallback: Send + Sync + 'static {
    fn receive(&self, events: &[Event]) -> Result<(), SinkError>;
}

impl<C: StreamCallback + ?Sized> StreamCallback for Arc<C> {
    fn receive(&self, events: &[Event]) -> Result<(), SinkError> {
        (**self).receive(events)
    }
}

impl<C: StreamCallback + ?Sized> StreamCallback for Box<C> {
    fn receive(&self, events: &[Event]) -> Result<(), SinkError> {
        (**self).receive(events)
    }
}

/// Adapter that turns a closure into a [`StreamCallback`].
pub struct FnCallback<F>(F);

impl<F> StreamCallback for FnCallback<F>
where
    F: Fn(&[Event]) -> Result<(), SinkError> + Send + Sync + 'static,
{
    fn receive(&self, events: &[Event]) -> Result<(), SinkError> {
        (self.0)(events)
    }
}

/// Wrap a closure as a sink.
///
/// ```
/// use stream_dispatch::{callback_fn, Event, StreamCallback};
///
/// let sink = callback_fn(|events: &[Event]| {
///     assert!(!events.is_empty());
///     Ok(())
/// });
/// sink.receive(&[Event::default()]).unwrap();
/// ```
pub fn callback_fn<F>(f: F) -> FnCallback<F>
where
    F: Fn(&[Event]) -> Result<(), SinkError> + Send + Sync + 'static,
{
    FnCallback(f)
}

thread_local! {
    /// Sink handles whose callback is running on this thread.
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Pops the handle off [`DELIVERING`] when the sink call ends, panics included.
struct DeliveryScope(usize);

impl DeliveryScope {
    fn enter(id: usize) -> Self {
        DELIVERING.with(|d| d.borrow_mut().push(id));
        Self(id)
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERING.with(|d| {
            let mut d = d.borrow_mut();
            if let Some(pos) = d.iter().rposition(|&id| id == self.0) {
                d.remove(pos);
            }
        });
    }
}

/// The dispatcher's reference to its sink, shared with the consumer loop.
///
/// `detach` may race with deliveries on another thread. The read guard is
/// held across the sink call, so once `detach` returns no delivery is still
/// running and none will start. Called from inside the sink itself, `detach`
/// only marks the handle closed: the running call is the caller's own.
pub(crate) struct SinkHandle {
    callback: RwLock<Option<Arc<dyn StreamCallback>>>,
    closed: AtomicBool,
}

impl SinkHandle {
    pub(crate) fn new(callback: Arc<dyn StreamCallback>) -> Self {
        Self {
            callback: RwLock::new(Some(callback)),
            closed: AtomicBool::new(false),
        }
    }

    /// Hand `events` to the sink. `Ok(false)` means the sink is detached and
    /// the call was a no-op.
    pub(crate) fn deliver(&self, events: &[Event]) -> Result<bool, SinkError> {
        if events.is_empty() {
            return Ok(true);
        }
        let callback = self.callback.read().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        match callback.as_ref() {
            Some(callback) => {
                let _scope = DeliveryScope::enter(self.id());
                callback.receive(events).map(|()| true)
            }
            None => Ok(false),
        }
    }

    /// Stop all future deliveries. Returns `false` if already detached.
    pub(crate) fn detach(&self) -> bool {
        let was_attached = !self.closed.swap(true, Ordering::AcqRel);
        if !self.is_delivering_here() {
            self.callback
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        was_attached
    }

    /// `true` when called from inside this handle's sink.
    pub(crate) fn is_delivering_here(&self) -> bool {
        let id = self.id();
        DELIVERING.with(|d| d.borrow().contains(&id))
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }
}
