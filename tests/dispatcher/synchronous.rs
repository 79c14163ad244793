//! Inline delivery: before start, and for streams with async disabled.

use std::panic::{self, AssertUnwindSafe};

use stream_dispatch::config::Annotation;
use stream_dispatch::{
    DispatchError, DispatcherConfig, EngineConfig, Receiver, SinkError, StreamDispatcher,
    StreamEvent, Value,
};

use crate::support::{quote, quote_stream, FlakySink, RecordingSink};

fn inline(sink: impl stream_dispatch::StreamCallback) -> StreamDispatcher {
    StreamDispatcher::new(&quote_stream(), DispatcherConfig::synchronous(), sink)
}

// ============================================================================
// Test 1: Single events go straight to the sink
// ============================================================================

#[test]
fn single_event_is_one_sink_call() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());

    dispatcher.receive_event(&quote(10)).unwrap();

    assert_eq!(sink.batches(), vec![vec![quote(10)]]);
}

#[test]
fn unstarted_async_dispatcher_delivers_inline() {
    let sink = RecordingSink::new();
    let dispatcher = StreamDispatcher::new(&quote_stream(), DispatcherConfig::default(), sink.clone());

    dispatcher
        .receive_values(7, vec![Value::from("IBM"), Value::Double(7.0)])
        .unwrap();

    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.threads(), vec![std::thread::current().name().map(str::to_string)]);
}

// ============================================================================
// Test 2: async = 'false' keeps the dispatcher inline after start
// ============================================================================

#[test]
fn async_disabled_stream_stays_inline_after_start() {
    let definition =
        quote_stream().annotation(Annotation::new("Config").element("Async", "FALSE"));
    let sink = RecordingSink::new();
    let dispatcher =
        StreamDispatcher::from_definition(&EngineConfig::default(), &definition, sink.clone())
            .unwrap();

    dispatcher.start().unwrap();
    assert!(dispatcher.is_started());
    assert!(!dispatcher.is_async());

    dispatcher.receive_event(&quote(1)).unwrap();
    assert_eq!(sink.calls(), 1);

    assert_eq!(dispatcher.stop(), None);
}

// ============================================================================
// Test 3: Batched receives accumulate until end of batch
// ============================================================================

#[test]
fn batched_receives_flush_at_end_of_batch() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());

    dispatcher.receive_batched(quote(1), false).unwrap();
    dispatcher.receive_batched(quote(2), false).unwrap();
    assert_eq!(dispatcher.pending_batch_len(), 2);
    assert_eq!(sink.calls(), 0);

    dispatcher.receive_batched(quote(3), true).unwrap();
    assert_eq!(dispatcher.pending_batch_len(), 0);
    assert_eq!(sink.batches(), vec![vec![quote(1), quote(2), quote(3)]]);

    dispatcher.receive_batched(quote(4), true).unwrap();
    assert_eq!(sink.batches()[1], vec![quote(4)]);
}

#[test]
fn receive_events_is_one_sink_call() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());

    dispatcher.receive_events(&[quote(1), quote(2)]).unwrap();

    assert_eq!(sink.batches(), vec![vec![quote(1), quote(2)]]);
}

#[test]
fn empty_receive_events_does_not_call_the_sink() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());

    dispatcher.receive_events(&[]).unwrap();

    assert_eq!(sink.calls(), 0);
}

// ============================================================================
// Test 4: Chained stream events are delivered one link per call
// ============================================================================

#[test]
fn stream_event_chain_is_delivered_link_by_link() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());
    let chain = StreamEvent::chain(vec![
        StreamEvent::new(1, vec![Value::from("A"), Value::Double(1.0)]),
        StreamEvent::new(2, vec![Value::from("B"), Value::Double(2.0)]),
        StreamEvent::new(3, vec![Value::from("C"), Value::Double(3.0)]),
    ])
    .unwrap();

    Receiver::receive_stream_event(&dispatcher, &chain).unwrap();

    let batches = sink.batches();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() == 1));
    assert_eq!(sink.timestamps(), vec![1, 2, 3]);
    assert_eq!(batches[1][0].values[0], Value::from("B"));
}

// ============================================================================
// Test 5: Sink errors surface to the caller
// ============================================================================

#[test]
fn sink_error_propagates_and_clears_the_batch() {
    let sink = FlakySink::new(vec![1], vec![]);
    let dispatcher = inline(sink.clone());

    dispatcher.receive_batched(quote(1), false).unwrap();
    let err = dispatcher.receive_batched(quote(2), true).unwrap_err();
    assert!(matches!(err, DispatchError::Sink(SinkError::Failed(_))));
    assert_eq!(dispatcher.pending_batch_len(), 0);

    dispatcher.receive_batched(quote(3), true).unwrap();
    assert_eq!(sink.recorded().batches(), vec![vec![quote(3)]]);
}

#[test]
fn failing_link_stops_the_rest_of_the_chain() {
    let sink = FlakySink::new(vec![2], vec![]);
    let dispatcher = inline(sink.clone());
    let chain = StreamEvent::chain((1..=3).map(|ts| StreamEvent::new(ts, vec![]))).unwrap();

    assert!(dispatcher.receive_stream_event(&chain).is_err());
    assert_eq!(sink.recorded().timestamps(), vec![1]);
}

// ============================================================================
// Test 6: Nothing reaches the sink after stop
// ============================================================================

#[test]
fn receives_after_stop_are_dropped() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());
    dispatcher.start().unwrap();
    dispatcher.stop();

    dispatcher.receive_event(&quote(1)).unwrap();
    dispatcher.receive_batched(quote(2), true).unwrap();
    dispatcher.receive_events(&[quote(3)]).unwrap();

    assert_eq!(sink.calls(), 0);
}

// ============================================================================
// Test 7: An unterminated batch is dropped on stop
// ============================================================================

#[test]
fn unterminated_batch_is_dropped_on_stop() {
    let sink = RecordingSink::new();
    let dispatcher = inline(sink.clone());
    dispatcher.start().unwrap();

    dispatcher.receive_batched(quote(1), false).unwrap();
    dispatcher.receive_batched(quote(2), false).unwrap();
    dispatcher.stop();

    assert_eq!(dispatcher.pending_batch_len(), 0);
    assert_eq!(sink.calls(), 0);
}

// ============================================================================
// Test 8: A sink panic mid-flush loses only that batch
// ============================================================================

#[test]
fn panicking_sink_loses_only_the_current_batch() {
    let sink = FlakySink::new(vec![], vec![1]);
    let dispatcher = inline(sink.clone());

    dispatcher.receive_batched(quote(1), false).unwrap();
    let flush = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.receive_batched(quote(2), true)));
    assert!(flush.is_err());
    assert_eq!(dispatcher.pending_batch_len(), 0);

    dispatcher.receive_batched(quote(3), false).unwrap();
    dispatcher.receive_batched(quote(4), true).unwrap();
    assert_eq!(sink.recorded().batches(), vec![vec![quote(3), quote(4)]]);
}
