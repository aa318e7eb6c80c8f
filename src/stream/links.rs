//! Pagination link header parsing.
//!
//! The listing endpoint describes neighbouring pages as
//! `<url>; rel="previous"; results="false"; cursor="1:0:1", <url>; rel="next"; ...`.
//! Parsing is fail-soft: a direction that is missing or malformed comes back
//! with `has_results == false` so it is never navigated or polled.

use std::collections::HashMap;

/// One direction of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cursor {
    pub href: String,
    pub cursor: String,
    pub has_results: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageLinks {
    pub previous: Cursor,
    pub next: Cursor,
}

impl PageLinks {
    /// Nothing newer exists upstream of the current page
    pub fn is_first_page(&self) -> bool {
        !self.previous.has_results
    }

    /// Every result of the query fits on the current page
    pub fn all_results_visible(&self) -> bool {
        !self.previous.has_results && !self.next.has_results
    }
}

/// Parse a link header. `None`, empty or whitespace-only input yields `None`.
pub fn parse_link_header(header: Option<&str>) -> Option<PageLinks> {
    let header = header?.trim();
    if header.is_empty() {
        return None;
    }

    let mut by_rel: HashMap<String, Cursor> = HashMap::new();
    for segment in split_top_level(header) {
        if let Some((rel, cursor)) = parse_segment(segment) {
            by_rel.entry(rel).or_insert(cursor);
        }
    }

    Some(PageLinks {
        previous: by_rel.remove("previous").unwrap_or_default(),
        next: by_rel.remove("next").unwrap_or_default(),
    })
}

/// Split on commas that are not inside `<...>` or a quoted value.
fn split_top_level(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_angle = false;
    let mut in_quote = false;
    let mut start = 0;

    for (i, c) in header.char_indices() {
        match c {
            '<' if !in_quote => in_angle = true,
            '>' if !in_quote => in_angle = false,
            '"' if !in_angle => in_quote = !in_quote,
            ',' if !in_angle && !in_quote => {
                parts.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&header[start..]);
    parts
}

fn parse_segment(segment: &str) -> Option<(String, Cursor)> {
    let segment = segment.trim();
    let rest = segment.strip_prefix('<')?;
    let close = rest.find('>')?;
    let href = rest[..close].trim().to_string();

    let mut attrs: HashMap<String, String> = HashMap::new();
    for attr in rest[close + 1..].split(';') {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, value) = attr.split_once('=')?;
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        attrs.insert(key.trim().to_ascii_lowercase(), value.to_string());
    }

    let rel = attrs.remove("rel")?;
    let cursor = Cursor {
        href,
        cursor: attrs.remove("cursor").unwrap_or_default(),
        has_results: attrs.get("results").is_some_and(|r| r == "true"),
    };
    Some((rel, cursor))
}
