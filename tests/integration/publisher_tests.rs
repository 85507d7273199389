//! Live status publisher: one loop per class, subscriber-gated teardown
//! and tolerance of failed polls.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use afd_webui::hostconfig::ProtocolIndex;
use afd_webui::session::{ChannelClass, LiveStatusPublisher};

use super::test_helpers::{as_source, assert_silent, next_json, open_channel, CountingSource};

const PERIOD: Duration = Duration::from_secs(2);

fn publisher(source: &Arc<CountingSource>) -> LiveStatusPublisher {
    LiveStatusPublisher::new(
        as_source(source),
        PERIOD,
        ProtocolIndex::new(),
        CancellationToken::new(),
    )
}

// ── One loop per class ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn two_subscribers_share_a_single_loop() {
    let source = Arc::new(CountingSource::default());
    let publisher = publisher(&source);
    let (a, mut rx_a) = open_channel(ChannelClass::Ctrl);
    let (b, mut rx_b) = open_channel(ChannelClass::Ctrl);

    assert!(publisher.subscribe(Arc::clone(&a)));
    assert!(!publisher.subscribe(Arc::clone(&b)));
    assert_eq!(publisher.subscriber_count(), 2);

    tokio::time::sleep(PERIOD * 3 + PERIOD / 2).await;
    assert_eq!(source.calls(), 3, "one poll per period, not per subscriber");

    for rx in [&mut rx_a, &mut rx_b] {
        for _ in 0..3 {
            let frame = next_json(rx).await;
            assert_eq!(frame["class"], "fsa");
            assert_eq!(frame["data"][0]["alias"], "host1");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn first_poll_waits_one_period() {
    let source = Arc::new(CountingSource::default());
    let publisher = publisher(&source);
    let (a, _rx) = open_channel(ChannelClass::Ctrl);

    publisher.subscribe(a);
    tokio::time::sleep(PERIOD / 2).await;
    assert_eq!(source.calls(), 0);
    tokio::time::sleep(PERIOD).await;
    assert_eq!(source.calls(), 1);
}

// ── Teardown ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_stops_after_the_last_unsubscribe() {
    let source = Arc::new(CountingSource::default());
    let publisher = publisher(&source);
    let (a, _rx_a) = open_channel(ChannelClass::Ctrl);
    let (b, _rx_b) = open_channel(ChannelClass::Ctrl);
    publisher.subscribe(Arc::clone(&a));
    publisher.subscribe(Arc::clone(&b));

    tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;
    assert_eq!(source.calls(), 2);

    assert!(!publisher.unsubscribe(a.id()));
    assert!(publisher.is_running());
    tokio::time::sleep(PERIOD).await;
    assert_eq!(source.calls(), 3, "remaining subscriber keeps the loop alive");

    assert!(publisher.unsubscribe(b.id()));
    assert!(!publisher.is_running());
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(source.calls(), 3, "no polls after the last subscriber left");
}

#[tokio::test(start_paused = true)]
async fn resubscribing_starts_a_fresh_loop() {
    let source = Arc::new(CountingSource::default());
    let publisher = publisher(&source);
    let (a, _rx) = open_channel(ChannelClass::Ctrl);

    assert!(publisher.subscribe(Arc::clone(&a)));
    assert!(publisher.unsubscribe(a.id()));
    assert!(!publisher.unsubscribe(a.id()));
    assert!(publisher.subscribe(Arc::clone(&a)));

    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_token_stops_the_loop() {
    let source = Arc::new(CountingSource::default());
    let shutdown = CancellationToken::new();
    let publisher = LiveStatusPublisher::new(
        as_source(&source),
        PERIOD,
        ProtocolIndex::new(),
        shutdown.clone(),
    );
    let (a, _rx) = open_channel(ChannelClass::Ctrl);
    publisher.subscribe(a);

    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    shutdown.cancel();
    assert!(!publisher.is_running());
    tokio::time::sleep(PERIOD * 3).await;
    assert_eq!(source.calls(), 1);
}

// ── Partial failure ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_polls_are_skipped_and_the_loop_continues() {
    let source = Arc::new(CountingSource::failing_first(2));
    let protocols = ProtocolIndex::new();
    let publisher = LiveStatusPublisher::new(
        as_source(&source),
        PERIOD,
        protocols.clone(),
        CancellationToken::new(),
    );
    let (a, mut rx) = open_channel(ChannelClass::Ctrl);
    publisher.subscribe(a);

    tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;
    assert_eq!(source.calls(), 2);
    assert!(publisher.is_running());
    assert_silent(&mut rx, Duration::from_millis(10)).await;

    tokio::time::sleep(PERIOD).await;
    assert_eq!(source.calls(), 3);
    assert_eq!(next_json(&mut rx).await["class"], "fsa");
    assert_eq!(protocols.protocols_of("host1"), ["FTP"]);
}

#[tokio::test(start_paused = true)]
async fn closed_subscriber_does_not_block_the_others() {
    let source = Arc::new(CountingSource::default());
    let publisher = publisher(&source);
    let (gone, _rx_gone) = open_channel(ChannelClass::Ctrl);
    let (live, mut rx_live) = open_channel(ChannelClass::Ctrl);
    publisher.subscribe(Arc::clone(&gone));
    publisher.subscribe(Arc::clone(&live));
    gone.mark_closed();

    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(next_json(&mut rx_live).await["class"], "fsa");
}
