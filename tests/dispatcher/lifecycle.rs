//! Start/stop transitions and shutdown policies.

use std::sync::{mpsc, Arc, Mutex, OnceLock, Weak};
use std::thread;

use stream_dispatch::{
    callback_fn, DispatchStats, DispatcherConfig, Event, ShutdownPolicy, StreamCallback,
    StreamDispatcher,
};

use crate::support::{quote, quote_stream, GatedSink, RecordingSink, WAIT};

// ============================================================================
// Test 1: start and stop are idempotent
// ============================================================================

#[test]
fn repeated_start_keeps_one_consumer() {
    let sink = RecordingSink::new();
    let dispatcher =
        StreamDispatcher::new(&quote_stream(), DispatcherConfig::default().with_capacity(8), sink.clone());

    dispatcher.start().unwrap();
    dispatcher.start().unwrap();
    for ts in 0..4 {
        dispatcher.receive_event(&quote(ts)).unwrap();
    }
    let stats = dispatcher.stop().unwrap();

    assert_eq!(stats.events_delivered, 4);
    assert_eq!(sink.timestamps(), vec![0, 1, 2, 3]);
}

#[test]
fn stop_before_start_and_twice_is_a_no_op() {
    let sink = RecordingSink::new();
    let dispatcher = StreamDispatcher::new(&quote_stream(), DispatcherConfig::default(), sink.clone());

    assert_eq!(dispatcher.stop(), None);
    // Still deliverable inline: stopping an unstarted dispatcher changes nothing.
    dispatcher.receive_event(&quote(1)).unwrap();
    assert_eq!(sink.calls(), 1);

    dispatcher.start().unwrap();
    assert!(dispatcher.stop().is_some());
    assert_eq!(dispatcher.stop(), None);
}

// ============================================================================
// Test 2: Drain delivers everything published before stop
// ============================================================================

#[test]
fn drain_delivers_pending_events_then_goes_quiet() {
    let sink = GatedSink::closed();
    let dispatcher = Arc::new(StreamDispatcher::new(
        &quote_stream(),
        DispatcherConfig::default()
            .with_capacity(16)
            .with_shutdown_policy(ShutdownPolicy::Drain),
        sink.clone(),
    ));
    dispatcher.start().unwrap();

    dispatcher.receive_event(&quote(0)).unwrap();
    assert!(sink.wait_entered(1));
    for ts in 1..10 {
        dispatcher.receive_event(&quote(ts)).unwrap();
    }

    let stopper = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || dispatcher.stop())
    };
    sink.open();
    let stats = stopper.join().unwrap().unwrap();

    assert_eq!(stats.events_delivered, 10);
    assert_eq!(stats.events_discarded, 0);
    assert_eq!(sink.recorded().timestamps(), (0..10).collect::<Vec<_>>());

    dispatcher.receive_event(&quote(99)).unwrap();
    assert_eq!(sink.recorded().timestamps().len(), 10);
}

// ============================================================================
// Test 3: Discard drops what the sink has not yet seen
// ============================================================================

#[test]
fn discard_accounts_for_every_event() {
    let sink = GatedSink::closed();
    let dispatcher = Arc::new(StreamDispatcher::new(
        &quote_stream(),
        DispatcherConfig::default()
            .with_capacity(16)
            .with_shutdown_policy(ShutdownPolicy::Discard),
        sink.clone(),
    ));
    dispatcher.start().unwrap();

    dispatcher.receive_event(&quote(0)).unwrap();
    assert!(sink.wait_entered(1));
    for ts in 1..10 {
        dispatcher.receive_event(&quote(ts)).unwrap();
    }

    let stopper = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || dispatcher.stop())
    };
    sink.open();
    let stats = stopper.join().unwrap().unwrap();

    // The batch already inside the sink completes; the rest may be dropped.
    let seen = sink.recorded().timestamps();
    assert_eq!(seen[0], 0);
    assert_eq!(stats.events_delivered, seen.len());
    assert_eq!(stats.events_delivered + stats.events_discarded, 10);

    dispatcher.receive_event(&quote(99)).unwrap();
    assert_eq!(sink.recorded().timestamps(), seen);
}

// ============================================================================
// Test 4: Dropping a started dispatcher stops it
// ============================================================================

#[test]
fn drop_drains_and_joins() {
    let sink = RecordingSink::new();
    {
        let dispatcher = StreamDispatcher::new(
            &quote_stream(),
            DispatcherConfig::default().with_capacity(4),
            sink.clone(),
        );
        dispatcher.start().unwrap();
        for ts in 0..20 {
            dispatcher.receive_event(&quote(ts)).unwrap();
        }
    }
    assert_eq!(sink.timestamps(), (0..20).collect::<Vec<_>>());
}

// ============================================================================
// Test 5: A sink may stop or drop its own dispatcher
// ============================================================================

/// Records each batch, then calls `stop()` on the registered dispatcher.
fn stopping_sink(
    seen: &RecordingSink,
    target: &Arc<OnceLock<Weak<StreamDispatcher>>>,
) -> (impl StreamCallback, mpsc::Receiver<Option<DispatchStats>>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let seen = seen.clone();
    let target = Arc::clone(target);
    let sink = callback_fn(move |events: &[Event]| {
        seen.receive(events)?;
        if let Some(dispatcher) = target.get().and_then(Weak::upgrade) {
            let _ = tx.lock().unwrap().send(dispatcher.stop());
        }
        Ok(())
    });
    (sink, rx)
}

#[test]
fn stop_from_inside_the_consumer_thread_returns() {
    let seen = RecordingSink::new();
    let target = Arc::new(OnceLock::new());
    let (sink, stopped) = stopping_sink(&seen, &target);
    let dispatcher = Arc::new(StreamDispatcher::new(
        &quote_stream(),
        DispatcherConfig::default().with_capacity(8),
        sink,
    ));
    target.set(Arc::downgrade(&dispatcher)).unwrap();
    dispatcher.start().unwrap();

    dispatcher.receive_event(&quote(0)).unwrap();

    assert_eq!(stopped.recv_timeout(WAIT).unwrap(), None);
    assert!(!dispatcher.is_started());
    dispatcher.receive_event(&quote(1)).unwrap();
    assert_eq!(dispatcher.stop(), None);
    assert_eq!(seen.timestamps(), vec![0]);
}

#[test]
fn stop_from_inside_an_inline_sink_returns() {
    let seen = RecordingSink::new();
    let target = Arc::new(OnceLock::new());
    let (sink, stopped) = stopping_sink(&seen, &target);
    let dispatcher = Arc::new(StreamDispatcher::new(
        &quote_stream(),
        DispatcherConfig::synchronous(),
        sink,
    ));
    target.set(Arc::downgrade(&dispatcher)).unwrap();
    dispatcher.start().unwrap();

    dispatcher.receive_batched(quote(0), true).unwrap();
    assert_eq!(stopped.recv_timeout(WAIT).unwrap(), None);
    assert_eq!(dispatcher.pending_batch_len(), 0);

    dispatcher.receive_event(&quote(1)).unwrap();
    dispatcher.receive_batched(quote(2), true).unwrap();
    assert_eq!(seen.timestamps(), vec![0]);
}

#[test]
fn dropping_the_last_handle_inside_the_sink_returns() {
    let seen = RecordingSink::new();
    let holder: Arc<Mutex<Option<Arc<StreamDispatcher>>>> = Arc::new(Mutex::new(None));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let sink = {
        let seen = seen.clone();
        let holder = Arc::clone(&holder);
        let release_rx = Mutex::new(release_rx);
        let done_tx = Mutex::new(done_tx);
        callback_fn(move |events: &[Event]| {
            seen.receive(events)?;
            let taken = holder.lock().unwrap().take();
            if let Some(dispatcher) = taken {
                // Wait until this is the only handle left.
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
                drop(dispatcher);
                let _ = done_tx.lock().unwrap().send(());
            }
            Ok(())
        })
    };

    let dispatcher = Arc::new(StreamDispatcher::new(
        &quote_stream(),
        DispatcherConfig::default().with_capacity(8),
        sink,
    ));
    let weak = Arc::downgrade(&dispatcher);
    dispatcher.start().unwrap();
    *holder.lock().unwrap() = Some(Arc::clone(&dispatcher));

    dispatcher.receive_event(&quote(0)).unwrap();
    drop(dispatcher);
    release_tx.send(()).unwrap();

    done_rx.recv_timeout(WAIT).unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(seen.timestamps(), vec![0]);
}
