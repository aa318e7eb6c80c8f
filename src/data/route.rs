//! Route parameters the stream consumes.
//!
//! A route is the `searchId` path segment plus the location query string.
//! Presence of a key matters independently of its value (`?query=` is an
//! explicit empty query), so values are kept in a map rather than as options.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    pub search_id: Option<String>,
    pub query: BTreeMap<String, String>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_id(mut self, id: impl Into<String>) -> Self {
        self.search_id = Some(id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// True when the location carries an explicit `query` key, even if empty
    pub fn has_query(&self) -> bool {
        self.query.contains_key("query")
    }

    pub fn cursor(&self) -> Option<&str> {
        self.param("cursor")
    }

    /// Parse a `key=value&key=value` query string (leading `?` optional)
    pub fn parse_query_string(mut self, qs: &str) -> Self {
        let qs = qs.strip_prefix('?').unwrap_or(qs);
        for pair in qs.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            let value = decode_component(value);
            self.query.insert(key, value);
        }
        self
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
