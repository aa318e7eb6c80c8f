//! Realtime cursor poller.
//!
//! Repeatedly fetches the `previous` cursor URL of the first page, i.e. the
//! issues that arrived since the page was loaded, and hands each batch to a
//! callback.
//!
//! ```text
//!  Disabled --set_endpoint--> Armed --enable--> Polling
//!     ^                                            |
//!     +------------------- disable ----------------+
//! ```
//!
//! The request for a tick is awaited before the next delay starts, so there
//! is never more than one poll request in flight.

use super::links::parse_link_header;
use crate::data::Issue;
use crate::integrations::api::fetch_issue_page;
use crate::integrations::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Disabled,
    Armed,
    Polling,
}

/// One successful poll
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Generation of the poller run that produced this batch
    pub generation: u64,
    pub items: Vec<Issue>,
    /// Raw link header of the poll response
    pub links: Option<String>,
    /// URL the next tick will request
    pub next_endpoint: String,
}

pub type PollCallback = Arc<dyn Fn(PollResult) + Send + Sync>;

pub struct CursorPoller {
    transport: Arc<dyn Transport>,
    interval: Duration,
    on_poll: PollCallback,
    state: PollState,
    endpoint: Option<String>,
    generation: u64,
    endpoint_tx: Option<watch::Sender<String>>,
    task: Option<JoinHandle<()>>,
}

impl CursorPoller {
    pub fn new(transport: Arc<dyn Transport>, interval: Duration, on_poll: PollCallback) -> Self {
        Self {
            transport,
            interval,
            on_poll,
            state: PollState::Disabled,
            endpoint: None,
            generation: 0,
            endpoint_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Results from an earlier run (before the last `disable`) are stale
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == PollState::Polling && generation == self.generation
    }

    pub fn set_endpoint(&mut self, url: impl Into<String>) {
        let url = url.into();
        match self.state {
            PollState::Disabled => self.state = PollState::Armed,
            PollState::Armed => {}
            PollState::Polling => {
                if let Some(tx) = &self.endpoint_tx {
                    tx.send_replace(url.clone());
                }
            }
        }
        self.endpoint = Some(url);
    }

    /// Record where a running loop moved to after following the cursor.
    /// The loop already polls `url`, so nothing is sent to it.
    pub fn follow(&mut self, url: &str) {
        if self.state == PollState::Polling {
            self.endpoint = Some(url.to_string());
        }
    }

    /// Start polling: first request immediately, then every interval.
    pub fn enable(&mut self) {
        match self.state {
            PollState::Polling => return,
            PollState::Disabled => {
                tracing::debug!("Realtime poller enabled without an endpoint, ignoring");
                return;
            }
            PollState::Armed => {}
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        let (endpoint_tx, endpoint_rx) = watch::channel(endpoint.clone());
        self.endpoint_tx = Some(endpoint_tx);
        self.state = PollState::Polling;
        tracing::debug!("Realtime polling started against {}", endpoint);

        self.task = Some(tokio::spawn(poll_loop(
            Arc::clone(&self.transport),
            self.interval,
            Arc::clone(&self.on_poll),
            self.generation,
            endpoint,
            endpoint_rx,
        )));
    }

    /// Stop polling. Idempotent; an in-flight request is abandoned and any
    /// result it might still deliver is recognisably stale.
    pub fn disable(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.state == PollState::Polling {
            tracing::debug!("Realtime polling stopped");
        }
        self.endpoint_tx = None;
        self.endpoint = None;
        self.state = PollState::Disabled;
        self.generation += 1;
    }
}

impl Drop for CursorPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    transport: Arc<dyn Transport>,
    interval: Duration,
    on_poll: PollCallback,
    generation: u64,
    mut endpoint: String,
    mut endpoint_rx: watch::Receiver<String>,
) {
    loop {
        if endpoint_rx.has_changed().unwrap_or(false) {
            endpoint = endpoint_rx.borrow_and_update().clone();
        }

        match fetch_issue_page(transport.as_ref(), &endpoint, &[]).await {
            Ok(page) => {
                // Follow the cursor forward so the next tick only sees newer issues
                if let Some(links) = parse_link_header(page.links.as_deref()) {
                    if !links.previous.href.is_empty() {
                        endpoint = links.previous.href;
                    }
                }
                on_poll(PollResult {
                    generation,
                    items: page.items,
                    links: page.links,
                    next_endpoint: endpoint.clone(),
                });
            }
            Err(e) => {
                tracing::warn!("Realtime poll of {} failed: {}", endpoint, e);
            }
        }

        tokio::time::sleep(interval).await;
    }
}
