//! Query resolution.
//!
//! Turns route parameters and the saved-search list into the query the
//! stream should show. Precedence: an explicit `query` in the route, then a
//! saved search named by id, then the user's (or project's) default search.

use crate::data::{
    EffectiveQuery, Navigation, Route, SavedSearch, Sort, StatsPeriod, DEFAULT_SORT,
    DEFAULT_STATS_PERIOD,
};
use once_cell::sync::Lazy;
use regex::Regex;

static ENVIRONMENT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)environment:("[^"]*"|\S+)"#).expect("valid environment regex")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub effective: EffectiveQuery,
    /// A search id was requested but is not in the saved-search list.
    /// Not an error: the default search was used and the URL should be
    /// corrected by the caller.
    pub search_not_found: bool,
}

/// Resolve the effective query. Pure function of its inputs.
pub fn resolve(route: &Route, retained_search_id: Option<&str>, saved: &[SavedSearch]) -> Resolution {
    let sort = route
        .param("sort")
        .map(Sort::from_param)
        .unwrap_or(DEFAULT_SORT);
    let stats_period = StatsPeriod::from_param(route.param("statsPeriod"));

    let mut effective = EffectiveQuery {
        query: String::new(),
        sort,
        stats_period,
        search_id: None,
        is_default_search: false,
    };

    if let Some(query) = route.param("query") {
        effective.query = query.to_string();
        return Resolution {
            effective,
            search_not_found: false,
        };
    }

    let mut search_not_found = false;
    let requested = route.search_id.as_deref().or(retained_search_id);
    if let Some(id) = requested {
        match saved.iter().find(|s| s.id == id) {
            Some(search) => {
                effective.search_id = Some(search.id.clone());
                effective.query = search.query.clone();
                return Resolution {
                    effective,
                    search_not_found: false,
                };
            }
            None => {
                tracing::debug!("Saved search {} not found, using default search", id);
                search_not_found = true;
            }
        }
    }

    if let Some(default) = default_search(saved) {
        effective.search_id = Some(default.id.clone());
        effective.query = default.query.clone();
        effective.is_default_search = true;
    }

    Resolution {
        effective,
        search_not_found,
    }
}

/// The user's own default wins over the project default
pub fn default_search(saved: &[SavedSearch]) -> Option<&SavedSearch> {
    saved
        .iter()
        .find(|s| s.is_user_default)
        .or_else(|| saved.iter().find(|s| s.is_default))
}

/// Trim and collapse internal whitespace
pub fn format_query(query: &str) -> String {
    WHITESPACE.replace_all(query.trim(), " ").into_owned()
}

/// Environment named by an `environment:` token in the query, if any
pub fn query_environment(query: &str) -> Option<String> {
    ENVIRONMENT_TOKEN
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('"').to_string())
}

/// Replace any `environment:` token with `environment` (or drop it for `None`)
pub fn with_environment(query: &str, environment: Option<&str>) -> String {
    let stripped = ENVIRONMENT_TOKEN.replace_all(query, " ");
    match environment {
        Some(env) if env.contains(char::is_whitespace) => {
            format_query(&format!("{} environment:\"{}\"", stripped, env))
        }
        Some(env) => format_query(&format!("{} environment:{}", stripped, env)),
        None => format_query(&stripped),
    }
}

/// URL the stream should live at for `effective`.
///
/// With a saved search active the query text is implied by the search and
/// left out; default sort and stats period are left out too.
pub fn navigation_target(org: &str, project: &str, effective: &EffectiveQuery) -> Navigation {
    let path = match &effective.search_id {
        Some(id) => format!("/{}/{}/searches/{}/", org, project, id),
        None => format!("/{}/{}/", org, project),
    };
    let mut nav = Navigation::to_path(path);

    if effective.search_id.is_none() {
        nav.query.insert("query".into(), effective.query.clone());
    }
    if effective.sort != DEFAULT_SORT {
        nav.query.insert("sort".into(), effective.sort.as_str().to_string());
    }
    if effective.stats_period != DEFAULT_STATS_PERIOD {
        nav.query
            .insert("statsPeriod".into(), effective.stats_period.as_str().to_string());
    }
    nav
}
