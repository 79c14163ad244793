use std::slice;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use super::callback::{SinkHandle, StreamCallback};
use super::consumer::{ConsumerLoop, DispatchStats, Slot};
use super::receiver::Receiver;
use crate::config::{
    DispatcherConfig, EngineConfig, ShutdownPolicy, StreamDefinition, DEFAULT_THREAD_PREFIX,
};
use crate::error::{ConfigError, DispatchError};
use crate::event::{Event, StreamEvent, Value};
use crate::executor::{Executor, ThreadExecutor};
use crate::ring::{ring_buffer, Producer};

enum Lifecycle {
    Created,
    Started {
        /// Receives the consumer loop's stats when it exits.
        consumer: Option<mpsc::Receiver<DispatchStats>>,
    },
    Stopped,
}

enum Queue {
    /// Not started, or started in synchronous mode.
    Unallocated,
    Active(Producer<Slot>),
    /// Torn down by `stop()`.
    Released,
}

/// Where a received event went.
enum Route {
    Queued,
    Direct,
    Closed,
}

/// Delivers one stream's results to its sink.
///
/// Until [`start`](Self::start) is called, and for the whole lifetime of a
/// stream declared `@config(async = 'false')`, every receive calls the sink
/// on the caller's thread. Once started asynchronously, events are copied
/// into a preallocated ring and a dedicated consumer loop calls the sink with
/// whatever batch it finds available.
///
/// Only one thread may receive into a dispatcher at a time. `start` and
/// `stop` may be called from any thread and are serialized against each
/// other.
///
/// A sink must not receive into its own dispatcher: with a full queue the
/// consumer thread would wait on itself. A sink may call `stop` on its own
/// dispatcher, or drop the last handle to it. That stop cannot wait for the
/// consumer loop it is running on, so it closes the sink, queues the halt
/// slot and returns `None`; the loop exits once the sink call returns.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use stream_dispatch::{callback_fn, DispatcherConfig, Event, StreamDefinition, StreamDispatcher, Value};
/// use stream_dispatch::config::AttributeType;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = {
///     let seen = Arc::clone(&seen);
///     callback_fn(move |events: &[Event]| {
///         seen.lock().unwrap().extend(events.iter().map(|e| e.timestamp));
///         Ok(())
///     })
/// };
///
/// let definition = StreamDefinition::new("Out").attribute("price", AttributeType::Double);
/// let dispatcher = StreamDispatcher::new(&definition, DispatcherConfig::default().with_capacity(16), sink);
///
/// dispatcher.start().unwrap();
/// for ts in 0..5 {
///     dispatcher.receive_values(ts, vec![Value::Double(1.5)]).unwrap();
/// }
/// dispatcher.stop();
///
/// assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
/// ```
pub struct StreamDispatcher {
    stream_id: String,
    attribute_count: usize,
    config: DispatcherConfig,
    sink: Arc<SinkHandle>,
    executor: Arc<dyn Executor>,
    /// Accumulates `receive_batched` events in synchronous mode.
    batch: Mutex<Vec<Event>>,
    queue: Mutex<Queue>,
    lifecycle: Mutex<Lifecycle>,
}

impl StreamDispatcher {
    /// Build a dispatcher for `definition`.
    ///
    /// A `thread_name` left at the bare default prefix gets the stream id
    /// appended, so consumer threads of different streams stay apart.
    pub fn new(
        definition: &StreamDefinition,
        mut config: DispatcherConfig,
        callback: impl StreamCallback,
    ) -> Self {
        if config.thread_name == DEFAULT_THREAD_PREFIX {
            config.thread_name = format!("{}-{}", DEFAULT_THREAD_PREFIX, definition.id);
        }
        Self {
            stream_id: definition.id.clone(),
            attribute_count: definition.attribute_count(),
            config,
            sink: Arc::new(SinkHandle::new(Arc::new(callback))),
            executor: Arc::new(ThreadExecutor),
            batch: Mutex::new(Vec::new()),
            queue: Mutex::new(Queue::Unallocated),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    /// Resolve settings from the engine and the stream's declared
    /// configuration, failing on conflicting declarations.
    pub fn from_definition(
        engine: &EngineConfig,
        definition: &StreamDefinition,
        callback: impl StreamCallback,
    ) -> Result<Self, ConfigError> {
        let config = DispatcherConfig::resolve(engine, definition)?;
        Ok(Self::new(definition, config, callback))
    }

    /// Run the consumer loop on `executor` instead of a dedicated thread.
    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// `true` while the transport queue is allocated.
    pub fn is_async(&self) -> bool {
        matches!(
            self.queue.lock().as_deref(),
            Ok(Queue::Active(_))
        )
    }

    pub fn is_started(&self) -> bool {
        matches!(
            self.lifecycle.lock().as_deref(),
            Ok(Lifecycle::Started { .. })
        )
    }

    /// Events accumulated by `receive_batched` and not yet flushed.
    pub fn pending_batch_len(&self) -> usize {
        self.lock_batch().len()
    }

    /// Allocate the queue and start the consumer loop.
    ///
    /// A no-op when already started or stopped. With async disabled the
    /// dispatcher is marked started but stays synchronous. Events left
    /// accumulating by `receive_batched` are moved into the queue, ahead of
    /// anything received afterwards.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("start"))?;
        if !matches!(*lifecycle, Lifecycle::Created) {
            return Ok(());
        }

        if !self.config.async_enabled {
            debug!(stream_id = %self.stream_id, "asynchronous delivery disabled, dispatching inline");
            *lifecycle = Lifecycle::Started { consumer: None };
            return Ok(());
        }

        let arity = self.attribute_count;
        let (mut producer, consumer) = ring_buffer(
            self.config.capacity,
            || Slot::with_arity(arity),
            self.config.wait_strategy.build(),
        )?;

        let (done_tx, done_rx) = mpsc::channel();
        let consumer_loop = ConsumerLoop::new(self.stream_id.clone(), consumer, Arc::clone(&self.sink));
        self.executor
            .execute(
                &self.config.thread_name,
                Box::new(move || {
                    let _ = done_tx.send(consumer_loop.run());
                }),
            )
            .map_err(|source| DispatchError::Spawn {
                stream: self.stream_id.clone(),
                source,
            })?;

        // The consumer is running, so a carried-over batch larger than the
        // ring only applies backpressure.
        let carried: Vec<Event> = self.lock_batch().drain(..).collect();
        for event in &carried {
            producer.claim().load(event.timestamp, &event.values);
        }
        if !carried.is_empty() {
            debug!(stream_id = %self.stream_id, count = carried.len(), "queued pending batch");
        }

        *self.lock_queue() = Queue::Active(producer);
        *lifecycle = Lifecycle::Started {
            consumer: Some(done_rx),
        };

        info!(
            stream_id = %self.stream_id,
            capacity = self.config.capacity,
            thread = %self.config.thread_name,
            "asynchronous delivery started"
        );
        Ok(())
    }

    /// Tear down the queue and consumer loop and detach the sink.
    ///
    /// A no-op unless started. Returns the consumer loop's stats when one was
    /// running and this is not the loop's own thread. When this returns, the
    /// sink will not be called again, except for a call already running on
    /// the current thread. Events still accumulating for a batch whose end
    /// never arrived are dropped and logged.
    pub fn stop(&self) -> Option<DispatchStats> {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let consumer = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Started { consumer } => consumer,
            other => {
                *lifecycle = other;
                return None;
            }
        };

        let unterminated = self.discard_pending_batch();

        let Some(done) = consumer else {
            self.sink.detach();
            info!(stream_id = %self.stream_id, "synchronous delivery stopped");
            return None;
        };

        if self.sink.is_delivering_here() {
            self.sink.detach();
            let queue = std::mem::replace(&mut *self.lock_queue(), Queue::Released);
            if let Queue::Active(producer) = queue {
                self.publish_halt(producer);
            }
            warn!(
                stream_id = %self.stream_id,
                "stopped from inside the sink, not waiting for the consumer loop"
            );
            return None;
        }

        if self.config.shutdown_policy == ShutdownPolicy::Discard {
            self.sink.detach();
        }

        let queue = std::mem::replace(&mut *self.lock_queue(), Queue::Released);
        if let Queue::Active(mut producer) = queue {
            producer.claim().halt();
        }

        let mut stats = done.recv().unwrap_or_else(|_| {
            warn!(stream_id = %self.stream_id, "consumer loop exited without reporting");
            DispatchStats::default()
        });
        stats.events_discarded += unterminated;
        self.sink.detach();

        info!(
            stream_id = %self.stream_id,
            delivered = stats.events_delivered,
            discarded = stats.events_discarded,
            sink_failures = stats.sink_failures,
            "asynchronous delivery stopped"
        );
        Some(stats)
    }

    pub fn receive_event(&self, event: &Event) -> Result<(), DispatchError> {
        match self.route(|producer| producer.claim().load(event.timestamp, &event.values))? {
            Route::Queued => Ok(()),
            Route::Direct => self.deliver(slice::from_ref(event)),
            Route::Closed => self.dropped(1),
        }
    }

    pub fn receive_values(&self, timestamp: i64, values: Vec<Value>) -> Result<(), DispatchError> {
        match self.route(|producer| producer.claim().load(timestamp, &values))? {
            Route::Queued => Ok(()),
            Route::Direct => self.deliver(&[Event::new(timestamp, values)]),
            Route::Closed => self.dropped(1),
        }
    }

    /// Deliver an already formed batch: one sink call in synchronous mode,
    /// one publish per event otherwise.
    pub fn receive_events(&self, events: &[Event]) -> Result<(), DispatchError> {
        let route = self.route(|producer| {
            for event in events {
                producer.claim().load(event.timestamp, &event.values);
            }
        })?;
        match route {
            Route::Queued => Ok(()),
            Route::Direct => self.deliver(events),
            Route::Closed => self.dropped(events.len()),
        }
    }

    pub fn receive_stream_event(&self, head: &StreamEvent) -> Result<(), DispatchError> {
        let route = self.route(|producer| {
            for link in head {
                producer.claim().load(link.timestamp, &link.output_data);
            }
        })?;
        match route {
            Route::Queued => Ok(()),
            Route::Direct => {
                for link in head {
                    self.deliver(&[link.to_event()])?;
                }
                Ok(())
            }
            Route::Closed => self.dropped(head.iter().count()),
        }
    }

    pub fn receive_batched(&self, event: Event, end_of_batch: bool) -> Result<(), DispatchError> {
        let route = self.route(|producer| {
            // Anything accumulated before the queue existed goes first.
            for pending in self.lock_batch().drain(..) {
                producer.claim().load(pending.timestamp, &pending.values);
            }
            producer.claim().load(event.timestamp, &event.values);
        })?;
        match route {
            Route::Queued => return Ok(()),
            Route::Closed => return self.dropped(1),
            Route::Direct => {}
        }

        let mut batch = self
            .batch
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("batch accumulation"))?;
        batch.push(event);
        if !end_of_batch {
            return Ok(());
        }
        // The sink runs without the lock so it may call back into `stop`.
        let mut events = std::mem::take(&mut *batch);
        drop(batch);

        // Dropped even on failure, so a rejected batch is not resent.
        let result = self.deliver(&events);
        events.clear();
        let mut batch = self.lock_batch();
        if batch.is_empty() {
            *batch = events;
        }
        result
    }

    /// Publish through the queue if one is allocated.
    fn route<F>(&self, publish: F) -> Result<Route, DispatchError>
    where
        F: FnOnce(&mut Producer<Slot>),
    {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("publish"))?;
        match &mut *queue {
            Queue::Active(producer) => {
                publish(producer);
                Ok(Route::Queued)
            }
            Queue::Unallocated => Ok(Route::Direct),
            Queue::Released => Ok(Route::Closed),
        }
    }

    fn deliver(&self, events: &[Event]) -> Result<(), DispatchError> {
        if self.sink.deliver(events)? {
            Ok(())
        } else {
            self.dropped(events.len())
        }
    }

    fn dropped(&self, count: usize) -> Result<(), DispatchError> {
        debug!(stream_id = %self.stream_id, count, "dispatcher stopped, dropping events");
        Ok(())
    }

    /// Drop a partial `receive_batched` run, returning how many events it held.
    fn discard_pending_batch(&self) -> usize {
        let count = self.lock_batch().drain(..).count();
        if count > 0 {
            debug!(stream_id = %self.stream_id, count, "dropping unterminated batch on stop");
        }
        count
    }

    /// Queue the terminal slot without blocking the current thread.
    ///
    /// Used from the consumer thread itself, whose unreleased batch may be
    /// what fills the ring; in that case a helper task waits for the slot.
    fn publish_halt(&self, mut producer: Producer<Slot>) {
        if let Some(mut claim) = producer.try_claim() {
            claim.halt();
            return;
        }
        let name = format!("{}-halt", self.config.thread_name);
        let task = Box::new(move || producer.claim().halt());
        if let Err(e) = self.executor.execute(&name, task) {
            error!(stream_id = %self.stream_id, error = %e, "could not queue halt slot, consumer loop will not exit");
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_batch(&self) -> MutexGuard<'_, Vec<Event>> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Receiver for StreamDispatcher {
    fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn receive_stream_event(&self, event: &StreamEvent) -> Result<(), DispatchError> {
        StreamDispatcher::receive_stream_event(self, event)
    }

    fn receive_event(&self, event: &Event) -> Result<(), DispatchError> {
        StreamDispatcher::receive_event(self, event)
    }

    fn receive_batched(&self, event: Event, end_of_batch: bool) -> Result<(), DispatchError> {
        StreamDispatcher::receive_batched(self, event, end_of_batch)
    }
}

impl Drop for StreamDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
