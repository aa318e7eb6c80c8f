//! Backend endpoints used by the issue stream.
//!
//! Thin wrappers over [`Transport`] that build paths and decode bodies.

use super::{ApiResponse, Transport};
use crate::data::{Environment, Issue, ProcessingIssues, SavedSearch};
use anyhow::{Context, Result};
use serde_json::json;

pub const LINK_HEADER: &str = "Link";
pub const HITS_HEADER: &str = "X-Hits";
pub const MAX_HITS_HEADER: &str = "X-Max-Hits";
pub const DIRECT_HIT_HEADER: &str = "X-Sentry-Direct-Hit";

/// Organization + project the stream is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub org: String,
    pub project: String,
    /// The project has received at least one event
    pub has_first_event: bool,
    pub environments_feature: bool,
}

impl ProjectContext {
    pub fn issues_path(&self) -> String {
        format!("/projects/{}/{}/issues/", self.org, self.project)
    }

    pub fn searches_path(&self) -> String {
        format!("/projects/{}/{}/searches/", self.org, self.project)
    }

    pub fn environments_path(&self) -> String {
        format!("/projects/{}/{}/environments/", self.org, self.project)
    }

    pub fn processing_issues_path(&self) -> String {
        format!("/projects/{}/{}/processingissues/", self.org, self.project)
    }
}

/// One page of the listing endpoint
#[derive(Debug, Clone, Default)]
pub struct IssuePage {
    pub items: Vec<Issue>,
    pub links: Option<String>,
    pub hits: u64,
    pub max_hits: u64,
    pub direct_hit: bool,
}

impl IssuePage {
    pub fn from_response(response: &ApiResponse) -> Result<Self> {
        let items: Vec<Issue> = serde_json::from_value(response.body.clone())
            .context("Failed to parse issue list")?;
        Ok(Self {
            direct_hit: response.header(DIRECT_HIT_HEADER) == Some("1") && !items.is_empty(),
            items,
            links: response.header(LINK_HEADER).map(String::from),
            hits: parse_count(response.header(HITS_HEADER)),
            max_hits: parse_count(response.header(MAX_HITS_HEADER)),
        })
    }
}

/// Count headers default to 0 when absent or unparseable
pub fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Why a listing request did not produce a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// Backend answered with an error status; carries its `detail` if any
    Status { status: u16, detail: Option<String> },
    /// No usable response at all
    Transport(String),
}

impl ListError {
    /// Message suitable for display next to a retry control
    pub fn message(&self) -> String {
        match self {
            Self::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            _ => GENERIC_LIST_ERROR.to_string(),
        }
    }
}

impl std::fmt::Display for ListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, detail } => match detail {
                Some(detail) => write!(f, "HTTP {}: {}", status, detail),
                None => write!(f, "HTTP {}", status),
            },
            Self::Transport(msg) => f.write_str(msg),
        }
    }
}

pub const GENERIC_LIST_ERROR: &str = "Unable to load issues";

/// GET a listing target (API path or absolute cursor URL)
pub async fn fetch_issue_page(
    transport: &dyn Transport,
    target: &str,
    params: &[(String, String)],
) -> std::result::Result<IssuePage, ListError> {
    let response = transport
        .get(target, params)
        .await
        .map_err(|e| ListError::Transport(format!("{:#}", e)))?;

    if !response.is_success() {
        return Err(ListError::Status {
            status: response.status,
            detail: response.error_detail(),
        });
    }

    IssuePage::from_response(&response).map_err(|e| ListError::Transport(format!("{:#}", e)))
}

pub async fn fetch_saved_searches(
    transport: &dyn Transport,
    project: &ProjectContext,
) -> Result<Vec<SavedSearch>> {
    let response = transport.get(&project.searches_path(), &[]).await?;
    if !response.is_success() {
        anyhow::bail!("Saved search request returned status {}", response.status);
    }
    serde_json::from_value(response.body).context("Failed to parse saved searches")
}

pub async fn create_saved_search(
    transport: &dyn Transport,
    project: &ProjectContext,
    name: &str,
    query: &str,
) -> Result<SavedSearch> {
    let response = transport
        .post(
            &project.searches_path(),
            json!({ "name": name, "query": query }),
        )
        .await?;
    if !response.is_success() {
        let detail = response
            .error_detail()
            .unwrap_or_else(|| format!("status {}", response.status));
        anyhow::bail!("Failed to save search: {}", detail);
    }
    serde_json::from_value(response.body).context("Failed to parse created saved search")
}

pub async fn fetch_environments(
    transport: &dyn Transport,
    project: &ProjectContext,
) -> Result<Vec<Environment>> {
    let response = transport.get(&project.environments_path(), &[]).await?;
    if !response.is_success() {
        anyhow::bail!("Environment request returned status {}", response.status);
    }
    serde_json::from_value(response.body).context("Failed to parse environments")
}

/// Processing issues are only a hint; `None` when missing or uninteresting.
pub async fn fetch_processing_issues(
    transport: &dyn Transport,
    project: &ProjectContext,
) -> Option<ProcessingIssues> {
    let response = match transport.get(&project.processing_issues_path(), &[]).await {
        Ok(r) if r.is_success() => r,
        Ok(r) => {
            tracing::debug!("Processing issues request returned status {}", r.status);
            return None;
        }
        Err(e) => {
            tracing::debug!("Failed to fetch processing issues: {}", e);
            return None;
        }
    };
    serde_json::from_value::<ProcessingIssues>(response.body)
        .ok()
        .filter(ProcessingIssues::needs_attention)
}
