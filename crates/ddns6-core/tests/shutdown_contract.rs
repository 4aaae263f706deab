//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - Pipelines terminate when their cancellation token fires
//! - Cancellation interrupts retry backoff and in-flight discovery
//! - One token stops every pipeline sharing it
//! - A Stopped event is emitted on clean shutdown
//!
//! If this test fails, someone has added:
//! - Sleeps or awaits that ignore cancellation
//! - Detached background tasks
//! - Blocking operations in the shutdown path

mod common;

use common::*;
use ddns6_core::{AddressFamily, PipelineEvent, Trigger, change_channel};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DOMAIN: &str = "home.example.com";

#[tokio::test]
async fn cancel_terminates_idle_timer_pipeline() {
    let source = Arc::new(ControlledSource::new(v6("2001:db8::1")));
    let provider = Arc::new(MockDnsProvider::with_record(DOMAIN, "AAAA", "2001:db8::1"));
    let cancel = CancellationToken::new();
    let (pipeline, mut events) = pipeline(&source, &provider, DOMAIN, AddressFamily::V6, &cancel);

    let handle = tokio::spawn(pipeline.run(Trigger::Interval(Duration::from_secs(180))));

    wait_for_event(&mut events, |e| matches!(e, PipelineEvent::UpdateSkipped { .. })).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Pipeline should terminate within 5 seconds");
    assert!(result.unwrap().unwrap().is_ok());

    let stopped = wait_for_event(&mut events, |e| matches!(e, PipelineEvent::Stopped { .. })).await;
    assert!(matches!(stopped, PipelineEvent::Stopped { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_unbounded_retry() {
    // Event-driven pipelines have no cycle deadline; only cancellation ends
    // a cycle that keeps failing
    let source = Arc::new(ControlledSource::new(v6("2001:db8::1")));
    let provider = Arc::new(MockDnsProvider::with_record(DOMAIN, "AAAA", "2001:db8::2"));
    provider.fail_next(usize::MAX);
    let cancel = CancellationToken::new();
    let (pipeline, _events) = pipeline(&source, &provider, DOMAIN, AddressFamily::V6, &cancel);
    let (_changes, stream) = change_channel(1);

    let handle = tokio::spawn(pipeline.run(Trigger::Changes(stream)));

    tokio::time::sleep(Duration::from_secs(600)).await;
    let attempts = provider.list_calls();
    assert!(attempts > 5, "expected retries to continue, got {}", attempts);

    cancel.cancel();
    handle.await.unwrap().unwrap();

    // Nothing keeps running after shutdown
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(provider.list_calls(), attempts);
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_in_flight_discovery() {
    let source = Arc::new(
        ControlledSource::new(v6("2001:db8::1")).with_delay(Duration::from_secs(3600)),
    );
    let provider = Arc::new(MockDnsProvider::with_record(DOMAIN, "AAAA", "2001:db8::2"));
    let cancel = CancellationToken::new();
    let (pipeline, _events) = pipeline(&source, &provider, DOMAIN, AddressFamily::V6, &cancel);

    let handle = tokio::spawn(pipeline.run(Trigger::Interval(Duration::from_secs(180))));

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let started = tokio::time::Instant::now();
    handle.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(provider.list_calls(), 0);
}

#[tokio::test]
async fn one_token_stops_every_pipeline() {
    let source = Arc::new(ControlledSource::with_addresses(vec![
        v6("2001:db8::1"),
        "203.0.113.7".parse().unwrap(),
    ]));
    let provider = Arc::new(MockDnsProvider::with_record(DOMAIN, "AAAA", "2001:db8::1"));
    provider.insert(DOMAIN, "A", "203.0.113.7");
    let cancel = CancellationToken::new();

    let (p6, _e6) = pipeline(&source, &provider, DOMAIN, AddressFamily::V6, &cancel);
    let (p4, _e4) = pipeline(&source, &provider, DOMAIN, AddressFamily::V4, &cancel);
    let (_changes, stream) = change_channel(1);

    let h6 = tokio::spawn(p6.run(Trigger::Changes(stream)));
    let h4 = tokio::spawn(p4.run(Trigger::Interval(Duration::from_secs(180))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        (h6.await.unwrap(), h4.await.unwrap())
    })
    .await
    .expect("both pipelines stop");

    assert!(joined.0.is_ok());
    assert!(joined.1.is_ok());
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let source = Arc::new(ControlledSource::new(v6("2001:db8::1")));
    let provider = Arc::new(MockDnsProvider::with_record(DOMAIN, "AAAA", "2001:db8::2"));
    let cancel = CancellationToken::new();
    let (pipeline, _events) = pipeline(&source, &provider, DOMAIN, AddressFamily::V6, &cancel);

    cancel.cancel();
    pipeline
        .run(Trigger::Interval(Duration::from_secs(180)))
        .await
        .unwrap();

    assert_eq!(source.discover_calls(), 0);
    assert_eq!(provider.list_calls(), 0);
}
