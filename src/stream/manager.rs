//! Ordered, deduplicated collection of visible issues.
//!
//! Holds an id order plus an id -> issue map. Each id appears at most once.
//! Whenever the visible id order changes it is published on a `watch`
//! channel, which is how observers learn about changes.

use crate::data::Issue;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

pub struct StreamManager {
    order: Vec<String>,
    items: HashMap<String, Issue>,
    limit: Option<usize>,
    ids_tx: watch::Sender<Vec<String>>,
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StreamManager {
    /// `limit` caps the number of retained ids; `None` keeps everything.
    pub fn new(limit: Option<usize>) -> Self {
        let (ids_tx, _) = watch::channel(Vec::new());
        Self {
            order: Vec::new(),
            items: HashMap::new(),
            limit,
            ids_tx,
        }
    }

    /// Receive the visible id list every time it changes
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.ids_tx.subscribe()
    }

    /// Replace the whole set; order equals input order.
    pub fn load_initial(&mut self, items: Vec<Issue>) {
        self.order.clear();
        self.items.clear();
        for item in items {
            if !self.items.contains_key(&item.id) {
                self.order.push(item.id.clone());
            }
            self.items.insert(item.id.clone(), item);
        }
        self.publish();
    }

    /// Merge a page: known ids are overwritten in place, new ids appended.
    pub fn push(&mut self, items: Vec<Issue>) {
        if items.is_empty() {
            return;
        }
        for item in items {
            if !self.items.contains_key(&item.id) {
                self.order.push(item.id.clone());
            }
            self.items.insert(item.id.clone(), item);
        }
        self.trim();
        self.publish();
    }

    /// Put realtime items at the front. Ids already present move to the
    /// front and take the new content.
    pub fn unshift(&mut self, items: Vec<Issue>) {
        if items.is_empty() {
            return;
        }
        let mut front: Vec<String> = Vec::with_capacity(items.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
        for item in items {
            if seen.insert(item.id.clone()) {
                front.push(item.id.clone());
            }
            self.items.insert(item.id.clone(), item);
        }
        self.order.retain(|id| !seen.contains(id));
        front.append(&mut self.order);
        self.order = front;
        self.trim();
        self.publish();
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, id: &str) -> Option<&Issue> {
        self.items.get(id)
    }

    /// Visible issues in display order
    pub fn all_items(&self) -> Vec<&Issue> {
        self.order.iter().filter_map(|id| self.items.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn trim(&mut self) {
        let Some(limit) = self.limit else {
            return;
        };
        if self.order.len() <= limit {
            return;
        }
        for id in self.order.drain(limit..) {
            self.items.remove(&id);
        }
    }

    fn publish(&self) {
        self.ids_tx.send_if_modified(|ids| {
            if *ids == self.order {
                false
            } else {
                ids.clone_from(&self.order);
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issue(id: &str, title: &str) -> Issue {
        Issue {
            id: id.into(),
            short_id: None,
            title: title.into(),
            culprit: None,
            project: None,
            count: 0,
            user_count: 0,
            first_seen: None,
            last_seen: None,
            matching_event_id: None,
        }
    }

    fn ids(m: &StreamManager) -> Vec<&str> {
        m.ids().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_load_initial_replaces_everything() {
        let mut m = StreamManager::default();
        m.push(vec![issue("a", "A"), issue("b", "B")]);
        m.load_initial(vec![issue("c", "C")]);
        assert_eq!(ids(&m), vec!["c"]);
        assert!(m.get("a").is_none());

        m.load_initial(vec![]);
        assert!(m.is_empty());
    }

    #[test]
    fn test_push_overwrites_in_place_and_appends() {
        let mut m = StreamManager::default();
        m.push(vec![issue("a", "A"), issue("b", "B")]);
        m.push(vec![issue("c", "C"), issue("a", "A2")]);
        assert_eq!(ids(&m), vec!["a", "b", "c"]);
        assert_eq!(m.get("a").unwrap().title, "A2");
    }

    #[test]
    fn test_unshift_moves_known_ids_to_front() {
        let mut m = StreamManager::default();
        m.push(vec![issue("a", "A"), issue("b", "B"), issue("c", "C")]);
        m.unshift(vec![issue("d", "D"), issue("b", "B2")]);
        assert_eq!(ids(&m), vec!["d", "b", "a", "c"]);
        assert_eq!(m.get("b").unwrap().title, "B2");
    }

    #[test]
    fn test_unshift_then_push_never_duplicates() {
        let mut m = StreamManager::default();
        m.push(vec![issue("a", "A"), issue("b", "B")]);
        m.unshift(vec![issue("x", "X"), issue("a", "A2"), issue("x", "X2")]);
        m.push(vec![issue("b", "B2"), issue("x", "X3"), issue("y", "Y")]);

        assert_eq!(ids(&m), vec!["x", "a", "b", "y"]);
        assert_eq!(m.get("x").unwrap().title, "X3");
        let unique: HashSet<_> = m.ids().iter().collect();
        assert_eq!(unique.len(), m.len());
    }

    #[test]
    fn test_limit_trims_tail() {
        let mut m = StreamManager::new(Some(3));
        m.push(vec![issue("a", "A"), issue("b", "B"), issue("c", "C")]);
        m.unshift(vec![issue("d", "D")]);
        assert_eq!(ids(&m), vec!["d", "a", "b"]);
        assert!(m.get("c").is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let mut m = StreamManager::default();
        let mut rx = m.subscribe();
        m.push(vec![issue("a", "A")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec!["a".to_string()]);

        // same order, different content: no id change to report
        m.push(vec![issue("a", "A2")]);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_empty_batches_are_noops() {
        let mut m = StreamManager::default();
        m.push(vec![issue("a", "A")]);
        m.unshift(vec![]);
        m.push(vec![]);
        assert_eq!(ids(&m), vec!["a"]);
        assert_eq!(m.all_items().len(), 1);
    }
}
