use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub mod route;

pub use route::Route;

/// Sort used when the route does not name one
pub const DEFAULT_SORT: Sort = Sort::Date;

/// Stats period used when the route names none or an unsupported one
pub const DEFAULT_STATS_PERIOD: StatsPeriod = StatsPeriod::Day;

/// Number of issues requested per page
pub const MAX_ITEMS: u32 = 25;

/// An issue (grouped error) as returned by the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub culprit: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectRef>,
    #[serde(default, deserialize_with = "count_from_any")]
    pub count: u64,
    #[serde(default)]
    pub user_count: u64,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Set by short-id lookups that resolved to a specific event
    #[serde(default)]
    pub matching_event_id: Option<String>,
}

/// Project reference embedded in each issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The backend encodes event counts as strings; accept either form.
fn count_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// A named, persisted query definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_user_default: bool,
}

/// Issue ordering understood by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    /// Last seen
    Date,
    /// First seen
    New,
    Priority,
    /// Event frequency
    Freq,
    /// Any other key the backend accepts, passed through untouched
    Other(String),
}

impl Sort {
    pub fn from_param(value: &str) -> Self {
        match value {
            "date" => Self::Date,
            "new" => Self::New,
            "priority" => Self::Priority,
            "freq" => Self::Freq,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Date => "date",
            Self::New => "new",
            Self::Priority => "priority",
            Self::Freq => "freq",
            Self::Other(s) => s,
        }
    }
}

impl Default for Sort {
    fn default() -> Self {
        DEFAULT_SORT
    }
}

impl std::fmt::Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Window over which per-issue stats are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsPeriod {
    Day,
    TwoWeeks,
}

impl StatsPeriod {
    /// Only the two supported literals are accepted; anything else falls back
    /// to the default period.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("24h") => Self::Day,
            Some("14d") => Self::TwoWeeks,
            _ => DEFAULT_STATS_PERIOD,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::TwoWeeks => "14d",
        }
    }
}

impl Default for StatsPeriod {
    fn default() -> Self {
        DEFAULT_STATS_PERIOD
    }
}

impl std::fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The query the stream is currently showing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectiveQuery {
    pub query: String,
    pub sort: Sort,
    pub stats_period: StatsPeriod,
    pub search_id: Option<String>,
    pub is_default_search: bool,
}

/// A deployment environment known to the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// Summary returned by the processing-issues endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingIssues {
    #[serde(default)]
    pub has_issues: bool,
    #[serde(default)]
    pub num_issues: u64,
    #[serde(default)]
    pub resolveable_issues: u64,
    #[serde(default)]
    pub issues_processing: u64,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl ProcessingIssues {
    /// Whether the summary is worth surfacing as a hint next to the stream
    pub fn needs_attention(&self) -> bool {
        self.has_issues || self.resolveable_issues > 0 || self.issues_processing > 0
    }
}

/// Where the UI layer should go next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Navigation {
    pub fn to_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Render as `path?key=value&...` with values percent-encoded
    pub fn to_url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let qs = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, qs)
    }
}
