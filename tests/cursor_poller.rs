//! Tests for the realtime cursor poller state machine and tick scheduling.

mod test_utils;

use issue_stream::stream::{CursorPoller, PollResult, PollState};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use test_utils::*;
use tokio::sync::mpsc;

const POLL_URL: &str = "https://example.test/api/0/projects/acme/web/issues/?cursor=1700000000000:0:1";

fn poller(transport: Arc<StubTransport>) -> (CursorPoller, mpsc::UnboundedReceiver<PollResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let poller = CursorPoller::new(
        transport,
        Duration::from_secs(3),
        Arc::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    (poller, rx)
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions() {
    let (mut poller, _rx) = poller(StubTransport::new());
    assert_eq!(poller.state(), PollState::Disabled);

    // Nothing to poll yet
    poller.enable();
    assert_eq!(poller.state(), PollState::Disabled);

    poller.set_endpoint(POLL_URL);
    assert_eq!(poller.state(), PollState::Armed);
    assert_eq!(poller.endpoint(), Some(POLL_URL));

    poller.enable();
    assert_eq!(poller.state(), PollState::Polling);

    let generation = poller.generation();
    poller.disable();
    assert_eq!(poller.state(), PollState::Disabled);
    assert_eq!(poller.endpoint(), None);
    assert!(poller.generation() > generation);
}

#[tokio::test(start_paused = true)]
async fn test_disable_is_idempotent() {
    let (mut poller, _rx) = poller(StubTransport::new());
    poller.disable();
    poller.disable();
    assert_eq!(poller.state(), PollState::Disabled);

    poller.set_endpoint(POLL_URL);
    poller.enable();
    poller.disable();
    poller.disable();
    assert_eq!(poller.state(), PollState::Disabled);
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_is_immediate_then_interval() {
    let transport = StubTransport::new();
    for _ in 0..3 {
        transport.reply(POLL_URL, page_with_links(&[], &link_header(false, false)));
    }
    let (mut poller, mut rx) = poller(transport.clone());
    let started = tokio::time::Instant::now();

    poller.set_endpoint(POLL_URL);
    poller.enable();
    for _ in 0..3 {
        rx.recv().await.expect("poll result");
    }

    let at: Vec<Duration> = transport
        .requests_to(POLL_URL)
        .iter()
        .map(|r| r.at - started)
        .collect();
    assert_eq!(
        at,
        vec![Duration::ZERO, Duration::from_secs(3), Duration::from_secs(6)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_results_carry_generation_and_items() {
    let transport = StubTransport::new();
    transport.reply(POLL_URL, page(&[("10", "new issue")]));
    let (mut poller, mut rx) = poller(transport);

    poller.set_endpoint(POLL_URL);
    poller.enable();
    let result = rx.recv().await.expect("poll result");

    assert_eq!(result.generation, poller.generation());
    assert!(poller.is_current(result.generation));
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, "10");
    assert_eq!(result.links, Some(link_header(false, true)));
}

#[tokio::test(start_paused = true)]
async fn test_results_from_previous_run_are_stale() {
    let transport = StubTransport::new();
    transport.reply_after(POLL_URL, Duration::from_secs(2), page(&[("1", "a")]));
    let (mut poller, _rx) = poller(transport);

    poller.set_endpoint(POLL_URL);
    poller.enable();
    let old_generation = poller.generation();
    poller.disable();

    poller.set_endpoint(POLL_URL);
    poller.enable();
    assert!(!poller.is_current(old_generation));
    assert!(poller.is_current(poller.generation()));
}

#[tokio::test(start_paused = true)]
async fn test_disable_abandons_inflight_request() {
    let transport = StubTransport::new();
    transport.reply_after(POLL_URL, Duration::from_secs(2), page(&[("1", "a")]));
    let (mut poller, mut rx) = poller(transport.clone());

    poller.set_endpoint(POLL_URL);
    poller.enable();
    tokio::time::sleep(Duration::from_millis(1)).await;
    poller.disable();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(transport.requests_to(POLL_URL).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_follows_previous_cursor_forward() {
    let next_poll = "https://example.test/api/0/projects/acme/web/issues/?cursor=1700000009000:0:1";
    let advanced = format!(
        "<{}>; rel=\"previous\"; results=\"false\"; cursor=\"1700000009000:0:1\", \
         <{}>; rel=\"next\"; results=\"true\"; cursor=\"1699999999000:0:0\"",
        next_poll, NEXT_HREF
    );
    let transport = StubTransport::new();
    transport.reply(POLL_URL, page_with_links(&[("1", "a")], &advanced));
    transport.reply(next_poll, page_with_links(&[("2", "b")], &advanced));
    let (mut poller, mut rx) = poller(transport.clone());

    poller.set_endpoint(POLL_URL);
    poller.enable();
    let first = rx.recv().await.expect("first poll");
    let second = rx.recv().await.expect("second poll");

    assert_eq!(first.items[0].id, "1");
    assert_eq!(first.next_endpoint, next_poll);
    assert_eq!(second.items[0].id, "2");

    poller.follow(&first.next_endpoint);
    assert_eq!(poller.endpoint(), Some(next_poll));
    assert_eq!(transport.requests_to(next_poll).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_set_endpoint_while_polling_redirects_next_tick() {
    let other = "https://example.test/api/0/projects/acme/web/issues/?cursor=1800000000000:0:1";
    let transport = StubTransport::new();
    transport.fail(POLL_URL, "unreachable");
    transport.reply(other, page(&[("2", "b")]));
    let (mut poller, mut rx) = poller(transport.clone());

    poller.set_endpoint(POLL_URL);
    poller.enable();
    tokio::time::sleep(Duration::from_millis(1)).await;
    poller.set_endpoint(other);
    assert_eq!(poller.state(), PollState::Polling);
    assert_eq!(poller.endpoint(), Some(other));

    let result = rx.recv().await.expect("poll result");
    assert_eq!(result.items[0].id, "2");
    assert_eq!(transport.requests_to(POLL_URL).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_follow_ignored_unless_polling() {
    let (mut poller, _rx) = poller(StubTransport::new());
    poller.follow(POLL_URL);
    assert_eq!(poller.endpoint(), None);

    poller.set_endpoint(POLL_URL);
    poller.follow("https://example.test/elsewhere");
    assert_eq!(poller.endpoint(), Some(POLL_URL));
}
