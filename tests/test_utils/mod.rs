//! Test utilities and fixtures for issue-stream tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use issue_stream::config::preference::MemoryPreference;
use issue_stream::data::Environment;
use issue_stream::integrations::api::ProjectContext;
use issue_stream::integrations::environment::EnvironmentList;
use issue_stream::integrations::{ApiResponse, Transport};
use issue_stream::stream::{IssueStream, Signal, StreamOptions};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const BASE: &str = "https://example.test/api/0";
pub const ISSUES_PATH: &str = "/projects/acme/web/issues/";
pub const SEARCHES_PATH: &str = "/projects/acme/web/searches/";
pub const PREVIOUS_HREF: &str = "https://example.test/api/0/projects/acme/web/issues/?cursor=1700000000000:0:1";
pub const NEXT_HREF: &str = "https://example.test/api/0/projects/acme/web/issues/?cursor=1699999999000:0:0";

/// A queued reply: wait `delay`, then answer
pub struct StubReply {
    pub delay: Duration,
    pub result: Result<ApiResponse, String>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub target: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport answering from per-target queues; an empty queue is a
/// transport failure.
#[derive(Default)]
pub struct StubTransport {
    replies: Mutex<HashMap<String, VecDeque<StubReply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, target: &str, response: ApiResponse) {
        self.reply_after(target, Duration::ZERO, response);
    }

    pub fn reply_after(&self, target: &str, delay: Duration, response: ApiResponse) {
        self.push(target, StubReply {
            delay,
            result: Ok(response),
        });
    }

    pub fn fail(&self, target: &str, message: &str) {
        self.push(target, StubReply {
            delay: Duration::ZERO,
            result: Err(message.to_string()),
        });
    }

    fn push(&self, target: &str, reply: StubReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, target: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.target == target)
            .collect()
    }

    async fn answer(
        &self,
        method: &'static str,
        target: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            target: target.to_string(),
            params: params.to_vec(),
            body,
            at: Instant::now(),
        });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.result.map_err(|e| anyhow::anyhow!(e))
            }
            None => Err(anyhow::anyhow!("no stub reply queued for {}", target)),
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, target: &str, params: &[(String, String)]) -> Result<ApiResponse> {
        self.answer("GET", target, params, None).await
    }

    async fn post(&self, target: &str, body: Value) -> Result<ApiResponse> {
        self.answer("POST", target, &[], Some(body)).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn project() -> ProjectContext {
    ProjectContext {
        org: "acme".into(),
        project: "web".into(),
        has_first_event: true,
        environments_feature: true,
    }
}

pub fn issue_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "shortId": format!("WEB-{}", id),
        "title": title,
        "culprit": "app/main.py in handler",
        "project": { "slug": "web", "name": "Web" },
        "count": "12",
        "userCount": 3,
        "firstSeen": "2024-01-01T00:00:00Z",
        "lastSeen": "2024-01-02T00:00:00Z"
    })
}

pub fn link_header(previous_results: bool, next_results: bool) -> String {
    format!(
        "<{}>; rel=\"previous\"; results=\"{}\"; cursor=\"1700000000000:0:1\", \
         <{}>; rel=\"next\"; results=\"{}\"; cursor=\"1699999999000:0:0\"",
        PREVIOUS_HREF, previous_results, NEXT_HREF, next_results
    )
}

/// First page of a longer result set
pub fn page(issues: &[(&str, &str)]) -> ApiResponse {
    page_with_links(issues, &link_header(false, true))
}

pub fn page_with_links(issues: &[(&str, &str)], links: &str) -> ApiResponse {
    let body = Value::Array(issues.iter().map(|(id, t)| issue_json(id, t)).collect());
    ApiResponse::new(200, body)
        .with_header("Link", links)
        .with_header("X-Hits", issues.len().to_string())
        .with_header("X-Max-Hits", "100")
}

pub fn saved_searches(list: Value) -> ApiResponse {
    ApiResponse::new(200, list)
}

pub struct Harness {
    pub stream: IssueStream,
    pub signals: mpsc::UnboundedReceiver<Signal>,
    pub transport: Arc<StubTransport>,
}

impl Harness {
    pub fn new(transport: Arc<StubTransport>, realtime: Option<bool>) -> Self {
        Self::with_environments(transport, realtime, EnvironmentList::default())
    }

    pub fn with_environments(
        transport: Arc<StubTransport>,
        realtime: Option<bool>,
        environments: EnvironmentList,
    ) -> Self {
        let (stream, signals) = IssueStream::new(
            StreamOptions::new(project()),
            transport.clone(),
            Box::new(environments),
            Box::new(MemoryPreference::new(realtime)),
        );
        Self {
            stream,
            signals,
            transport,
        }
    }

    /// Apply background results until `done` holds
    pub async fn drive_until(&mut self, mut done: impl FnMut(&IssueStream) -> bool) {
        let stream = &mut self.stream;
        tokio::time::timeout(Duration::from_secs(120), async {
            while !done(&*stream) {
                stream.step().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    /// Apply whatever arrives within `window`
    pub async fn drive_for(&mut self, window: Duration) {
        let stream = &mut self.stream;
        let _ = tokio::time::timeout(window, async {
            loop {
                stream.step().await;
            }
        })
        .await;
    }

    pub fn drain_signals(&mut self) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            out.push(signal);
        }
        out
    }
}

pub fn environments(names: &[&str]) -> EnvironmentList {
    EnvironmentList::new(
        names
            .iter()
            .map(|n| Environment {
                id: None,
                name: n.to_string(),
            })
            .collect(),
    )
}
