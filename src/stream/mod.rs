//! Live issue stream
//!
//! Owns everything needed to show one project's issue list for the current
//! route: the resolved query, the visible issues, pagination state and the
//! realtime poller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        IssueStream                           │
//! │   Route ──► query::resolve ──► fetch_data ──► listing task   │
//! │                                                  │           │
//! │   StreamManager ◄── handle_event ◄── events ◄────┤           │
//! │        │                 │                       │           │
//! │   watch<ids>        resume_polling ──► CursorPoller task     │
//! │                          │                                   │
//! │                     Signal channel (navigation, state)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state lives in `IssueStream` and is only touched through `&mut self`.
//! Network work runs in spawned tasks that report back through one event
//! channel; results are applied one at a time in [`IssueStream::handle_event`].
//! Listing results carry the epoch they were issued under and poll results
//! the poller generation, so superseded responses are dropped.

pub mod links;
pub mod manager;
pub mod poller;
pub mod query;

pub use links::{parse_link_header, Cursor, PageLinks};
pub use manager::StreamManager;
pub use poller::{CursorPoller, PollResult, PollState};
pub use query::{resolve, Resolution};

use crate::config::preference::{initial_realtime, RealtimePreference};
use crate::config::Config;
use crate::data::{
    EffectiveQuery, Issue, Navigation, ProcessingIssues, Route, SavedSearch, Sort, StatsPeriod,
};
use crate::integrations::api::{self, IssuePage, ListError, ProjectContext};
use crate::integrations::environment::EnvironmentStore;
use crate::integrations::Transport;
use crate::util::send_or_log;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Listing state for the current query epoch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Errored(String),
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The stream moved to a new URL (query, sort, period or search changed)
    Navigate(Navigation),
    /// The query matched exactly one issue; go to it instead of the list
    DirectHit(Navigation),
    /// Loading/error/count state changed
    StateChanged,
    ProcessingIssues(ProcessingIssues),
}

/// Results delivered by background tasks
#[derive(Debug)]
pub enum StreamEvent {
    SavedSearches(Result<Vec<SavedSearch>, String>),
    SavedSearchCreated(Result<SavedSearch, String>),
    Listing {
        epoch: u64,
        result: Result<IssuePage, ListError>,
    },
    Poll(PollResult),
    ProcessingIssues(Option<ProcessingIssues>),
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub project: ProjectContext,
    pub page_limit: u32,
    pub poll_interval: Duration,
    pub collection_limit: Option<usize>,
}

impl StreamOptions {
    pub fn new(project: ProjectContext) -> Self {
        Self {
            project,
            page_limit: crate::data::MAX_ITEMS,
            poll_interval: poller::DEFAULT_POLL_INTERVAL,
            collection_limit: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            project: config.project_context(),
            page_limit: config.stream.page_limit,
            poll_interval: config.polling.interval(),
            collection_limit: config.stream.collection_limit,
        }
    }
}

pub struct IssueStream {
    project: ProjectContext,
    page_limit: u32,
    transport: Arc<dyn Transport>,
    environments: Box<dyn EnvironmentStore>,
    preference: Box<dyn RealtimePreference>,
    manager: StreamManager,
    poller: CursorPoller,

    route: Route,
    effective: EffectiveQuery,
    cursor: Option<String>,
    saved_searches: Vec<SavedSearch>,
    saved_searches_loading: bool,
    fetch_after_saved_searches: bool,

    fetch_state: FetchState,
    page_links: Option<String>,
    parsed_links: Option<PageLinks>,
    query_count: Option<u64>,
    query_max_count: Option<u64>,
    realtime_active: bool,
    processing_issues: Option<ProcessingIssues>,

    epoch: u64,
    in_flight_query: String,
    listing: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl IssueStream {
    /// Build a stream; the returned receiver carries [`Signal`]s.
    pub fn new(
        options: StreamOptions,
        transport: Arc<dyn Transport>,
        environments: Box<dyn EnvironmentStore>,
        preference: Box<dyn RealtimePreference>,
    ) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (signals, signals_rx) = mpsc::unbounded_channel();

        let poll_tx = events_tx.clone();
        let poller = CursorPoller::new(
            Arc::clone(&transport),
            options.poll_interval,
            Arc::new(move |result| send_or_log(&poll_tx, StreamEvent::Poll(result), "poll result")),
        );

        let realtime_active = initial_realtime(preference.as_ref(), options.project.has_first_event);

        let stream = Self {
            project: options.project,
            page_limit: options.page_limit,
            transport,
            environments,
            preference,
            manager: StreamManager::new(options.collection_limit),
            poller,
            route: Route::default(),
            effective: EffectiveQuery::default(),
            cursor: None,
            saved_searches: Vec::new(),
            saved_searches_loading: false,
            fetch_after_saved_searches: false,
            fetch_state: FetchState::Idle,
            page_links: None,
            parsed_links: None,
            query_count: None,
            query_max_count: None,
            realtime_active,
            processing_issues: None,
            epoch: 0,
            in_flight_query: String::new(),
            listing: None,
            events_tx,
            events_rx,
            signals,
        };
        (stream, signals_rx)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn effective(&self) -> &EffectiveQuery {
        &self.effective
    }

    pub fn fetch_state(&self) -> &FetchState {
        &self.fetch_state
    }

    pub fn is_loading(&self) -> bool {
        self.fetch_state == FetchState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.fetch_state {
            FetchState::Errored(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn items(&self) -> Vec<&Issue> {
        self.manager.all_items()
    }

    pub fn ids(&self) -> &[String] {
        self.manager.ids()
    }

    /// Visible ids, published on every change
    pub fn subscribe_ids(&self) -> watch::Receiver<Vec<String>> {
        self.manager.subscribe()
    }

    pub fn query_count(&self) -> Option<u64> {
        self.query_count
    }

    pub fn query_max_count(&self) -> Option<u64> {
        self.query_max_count
    }

    /// Raw link header of the last listing (or drifted poll) response
    pub fn page_links(&self) -> Option<&str> {
        self.page_links.as_deref()
    }

    pub fn links(&self) -> Option<&PageLinks> {
        self.parsed_links.as_ref()
    }

    pub fn saved_searches(&self) -> &[SavedSearch] {
        &self.saved_searches
    }

    pub fn saved_searches_loading(&self) -> bool {
        self.saved_searches_loading
    }

    pub fn processing_issues(&self) -> Option<&ProcessingIssues> {
        self.processing_issues.as_ref()
    }

    pub fn realtime_active(&self) -> bool {
        self.realtime_active
    }

    pub fn poller_state(&self) -> PollState {
        self.poller.state()
    }

    pub fn poller_endpoint(&self) -> Option<&str> {
        self.poller.endpoint()
    }

    pub fn active_environment(&self) -> Option<&str> {
        self.environments.active().map(|e| e.name.as_str())
    }

    /// Every result of the query is on this page (no pagination needed)
    pub fn all_results_visible(&self) -> bool {
        self.parsed_links
            .as_ref()
            .is_some_and(PageLinks::all_results_visible)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for the next background result
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events_rx.recv().await
    }

    /// Wait for one background result and apply it
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::SavedSearches(result) => self.on_saved_searches(result),
            StreamEvent::SavedSearchCreated(result) => self.on_saved_search_created(result),
            StreamEvent::Listing { epoch, result } => self.on_listing(epoch, result),
            StreamEvent::Poll(result) => self.on_realtime_poll(result),
            StreamEvent::ProcessingIssues(summary) => {
                if let Some(summary) = summary {
                    self.processing_issues = Some(summary.clone());
                    self.signal(Signal::ProcessingIssues(summary));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Initial load for `route`.
    ///
    /// Saved searches are always fetched. With an explicit query in the route
    /// the listing starts right away; otherwise it waits for the saved
    /// searches, since one of them may define the query.
    pub fn start(&mut self, route: Route) {
        self.fetch_saved_searches();
        self.fetch_processing_issues();

        if route.has_query() {
            self.effective = resolve(&route, None, &[]).effective;
            self.cursor = route.cursor().map(String::from);
            self.route = route;
            self.fetch_data();
        } else {
            self.defer_until_saved_searches(route);
        }
    }

    /// Adopt `route` but leave resolving its search id, and loading, to
    /// [`Self::on_saved_searches`].
    fn defer_until_saved_searches(&mut self, route: Route) {
        self.effective = resolve(&route, None, &[]).effective;
        self.effective.search_id = route.search_id.clone();
        self.cursor = route.cursor().map(String::from);
        self.route = route;
        self.fetch_after_saved_searches = true;
    }

    /// Teardown: abandon the listing request and stop polling
    pub fn shutdown(&mut self) {
        self.cancel_listing();
    }

    /// Abandon the in-flight listing (its result becomes stale) and stop polling
    fn cancel_listing(&mut self) {
        if let Some(task) = self.listing.take() {
            task.abort();
        }
        self.epoch += 1;
        self.poller.disable();
    }

    fn fetch_saved_searches(&mut self) {
        self.saved_searches_loading = true;
        let transport = Arc::clone(&self.transport);
        let project = self.project.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api::fetch_saved_searches(transport.as_ref(), &project)
                .await
                .map_err(|e| format!("{:#}", e));
            send_or_log(&tx, StreamEvent::SavedSearches(result), "saved searches");
        });
    }

    fn fetch_processing_issues(&mut self) {
        let transport = Arc::clone(&self.transport);
        let project = self.project.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let summary = api::fetch_processing_issues(transport.as_ref(), &project).await;
            send_or_log(&tx, StreamEvent::ProcessingIssues(summary), "processing issues");
        });
    }

    fn on_saved_searches(&mut self, result: Result<Vec<SavedSearch>, String>) {
        self.saved_searches_loading = false;
        let mut needs_data = std::mem::take(&mut self.fetch_after_saved_searches);

        match result {
            Ok(list) => {
                self.saved_searches = list;
                // An explicit route query is already loaded and unaffected
                if !self.route.has_query() {
                    let retained = self.effective.search_id.clone();
                    let resolution =
                        resolve(&self.route, retained.as_deref(), &self.saved_searches);
                    needs_data |= resolution.effective != self.effective;
                    self.effective = resolution.effective;

                    if resolution.search_not_found {
                        self.correct_route();
                    }
                }
                if needs_data {
                    self.fetch_data();
                }
            }
            Err(e) => {
                // Degrade to "no saved searches" and still load the stream
                tracing::error!("Failed to fetch saved searches: {}", e);
                self.saved_searches.clear();
                self.effective.search_id = None;
                self.effective.is_default_search = false;
                if !self.route.has_query() {
                    self.effective.query.clear();
                }
                if needs_data {
                    self.fetch_data();
                }
            }
        }
        self.signal(Signal::StateChanged);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Route and user input
    // ─────────────────────────────────────────────────────────────────────────

    /// The router moved. Re-resolve and refetch when anything relevant changed.
    pub fn on_route_change(&mut self, route: Route) {
        let search_id_changed = if self.effective.is_default_search {
            route.search_id.is_some()
        } else {
            route.search_id != self.effective.search_id
        };
        if !search_id_changed && route.query == self.route.query {
            return;
        }
        // Without the list every search id looks unknown
        if self.saved_searches_loading && !route.has_query() {
            self.cancel_listing();
            self.manager.load_initial(Vec::new());
            self.fetch_state = FetchState::Loading;
            self.defer_until_saved_searches(route);
            self.signal(Signal::StateChanged);
            return;
        }

        let retained = self.effective.search_id.clone();
        let resolution = resolve(&route, retained.as_deref(), &self.saved_searches);
        self.effective = resolution.effective;
        self.cursor = route.cursor().map(String::from);
        self.route = route;

        if resolution.search_not_found {
            self.correct_route();
        }
        self.fetch_data();
    }

    /// The global environment changed; rewrite the query to match and reload
    pub fn on_environment_change(&mut self, name: Option<&str>) {
        let environment = name.and_then(|n| self.environments.get_by_name(n));
        self.environments.set_active(environment);
        self.effective.query = query::with_environment(&self.effective.query, name);
        self.cursor = None;
        self.fetch_data();
    }

    pub fn on_search(&mut self, query: &str) {
        if query == self.effective.query {
            self.fetch_data();
            return;
        }
        self.effective.query = query.to_string();
        self.effective.search_id = None;
        self.effective.is_default_search = false;
        self.transition();
    }

    pub fn on_sort_change(&mut self, sort: Sort) {
        if sort == self.effective.sort {
            return;
        }
        self.effective.sort = sort;
        self.transition();
    }

    pub fn on_stats_period_change(&mut self, period: StatsPeriod) {
        if period == self.effective.stats_period {
            return;
        }
        self.effective.stats_period = period;
        self.transition();
    }

    /// Flip realtime updates and remember the choice
    pub fn set_realtime(&mut self, active: bool) {
        if let Err(e) = self.preference.write(active) {
            tracing::warn!("Failed to persist realtime preference: {}", e);
        }
        if active == self.realtime_active {
            return;
        }
        self.realtime_active = active;
        if active {
            self.resume_polling();
        } else {
            self.poller.disable();
        }
        self.signal(Signal::StateChanged);
    }

    pub fn create_saved_search(&mut self, name: &str, query: &str) {
        let transport = Arc::clone(&self.transport);
        let project = self.project.clone();
        let tx = self.events_tx.clone();
        let name = name.to_string();
        let query = query.to_string();
        tokio::spawn(async move {
            let result = api::create_saved_search(transport.as_ref(), &project, &name, &query)
                .await
                .map_err(|e| format!("{:#}", e));
            send_or_log(&tx, StreamEvent::SavedSearchCreated(result), "created saved search");
        });
    }

    fn on_saved_search_created(&mut self, result: Result<SavedSearch, String>) {
        match result {
            Ok(search) => {
                self.effective.search_id = Some(search.id.clone());
                self.effective.query = search.query.clone();
                self.effective.is_default_search = false;
                self.saved_searches.push(search);
                self.transition();
            }
            Err(e) => {
                tracing::warn!("{}", e);
            }
        }
    }

    /// Move to the URL for the current effective query and load it.
    /// Any inherited cursor belongs to the old query and is dropped.
    fn transition(&mut self) {
        let nav = query::navigation_target(&self.project.org, &self.project.project, &self.effective);
        self.route = Route {
            search_id: self.effective.search_id.clone(),
            query: nav.query.clone(),
        };
        self.cursor = None;
        self.signal(Signal::Navigate(nav));
        self.fetch_data();
    }

    /// Rewrite the URL after an unknown saved search fell back to the default
    fn correct_route(&mut self) {
        let nav = query::navigation_target(&self.project.org, &self.project.project, &self.effective);
        self.route = Route {
            search_id: self.effective.search_id.clone(),
            query: nav.query.clone(),
        };
        self.signal(Signal::Navigate(nav));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetching
    // ─────────────────────────────────────────────────────────────────────────

    /// (Re)load the current page of the current query.
    pub fn fetch_data(&mut self) {
        self.manager.load_initial(Vec::new());
        self.fetch_state = FetchState::Loading;
        self.query_count = None;
        self.query_max_count = None;

        let mut query = query::format_query(&self.effective.query);
        let mut environment = None;
        let active = self.environments.active().map(|e| e.name.clone());

        // The query's own environment wins and becomes the global one;
        // otherwise the global environment is added to the query.
        match query::query_environment(&query) {
            Some(named) => {
                if active.as_deref() != Some(named.as_str()) && self.project.environments_feature {
                    let env = self.environments.get_by_name(&named);
                    self.environments.set_active(env);
                }
                environment = Some(named);
            }
            None => {
                if let Some(active) = active {
                    query = query::with_environment(&query, Some(&active));
                    environment = Some(active);
                }
            }
        }

        let mut params: Vec<(String, String)> = vec![
            ("query".into(), query.clone()),
            ("limit".into(), self.page_limit.to_string()),
            ("sort".into(), self.effective.sort.as_str().to_string()),
            ("statsPeriod".into(), self.effective.stats_period.as_str().to_string()),
            ("shortIdLookup".into(), "1".into()),
        ];
        if let Some(environment) = environment {
            params.push(("environment".into(), environment));
        }
        if let Some(cursor) = &self.cursor {
            params.push(("cursor".into(), cursor.clone()));
        }

        self.cancel_listing();
        self.in_flight_query = query;
        let epoch = self.epoch;
        let transport = Arc::clone(&self.transport);
        let path = self.project.issues_path();
        let tx = self.events_tx.clone();
        tracing::debug!("Fetching issues (epoch {}) with {:?}", epoch, params);

        self.listing = Some(tokio::spawn(async move {
            let result = api::fetch_issue_page(transport.as_ref(), &path, &params).await;
            send_or_log(&tx, StreamEvent::Listing { epoch, result }, "issue page");
        }));
        self.signal(Signal::StateChanged);
    }

    fn on_listing(&mut self, epoch: u64, result: Result<IssuePage, ListError>) {
        if epoch != self.epoch {
            tracing::debug!("Discarding superseded issue page (epoch {})", epoch);
            return;
        }
        self.listing = None;

        match result {
            Ok(page) if page.direct_hit => {
                let target = page.items.first().and_then(|issue| self.direct_hit_target(issue));
                match target {
                    Some(nav) => {
                        self.set_page_links(None);
                        self.fetch_state = FetchState::Loaded;
                        self.signal(Signal::DirectHit(nav));
                    }
                    None => self.apply_page(page),
                }
            }
            Ok(page) => self.apply_page(page),
            Err(e) => {
                tracing::warn!("Failed to load issues: {}", e);
                // Links of the previous query must not re-arm polling
                self.set_page_links(None);
                self.fetch_state = FetchState::Errored(e.message());
            }
        }

        self.resume_polling();
        self.signal(Signal::StateChanged);
    }

    fn apply_page(&mut self, page: IssuePage) {
        self.manager.push(page.items);
        self.effective.query = std::mem::take(&mut self.in_flight_query);
        self.query_count = Some(page.hits);
        self.query_max_count = Some(page.max_hits);
        self.set_page_links(page.links);
        self.fetch_state = FetchState::Loaded;
    }

    /// Short-id lookups can land in another project, so the issue's own
    /// project slug is used rather than the current one.
    fn direct_hit_target(&self, issue: &Issue) -> Option<Navigation> {
        let slug = issue.project.as_ref()?.slug.as_str();
        let path = match &issue.matching_event_id {
            Some(event_id) => format!(
                "/{}/{}/issues/{}/events/{}/",
                self.project.org, slug, issue.id, event_id
            ),
            None => format!("/{}/{}/issues/{}/", self.project.org, slug, issue.id),
        };
        Some(Navigation::to_path(path))
    }

    fn set_page_links(&mut self, links: Option<String>) {
        self.parsed_links = parse_link_header(links.as_deref());
        self.page_links = links;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Realtime
    // ─────────────────────────────────────────────────────────────────────────

    /// Poll for new issues only while on the newest page with realtime on.
    pub fn resume_polling(&mut self) {
        if !self.realtime_active {
            return;
        }
        let Some(links) = &self.parsed_links else {
            return;
        };
        if !links.is_first_page() || links.previous.href.is_empty() {
            return;
        }
        let href = links.previous.href.clone();
        self.poller.set_endpoint(href);
        self.poller.enable();
    }

    fn on_realtime_poll(&mut self, result: PollResult) {
        if !self.poller.is_current(result.generation) {
            tracing::debug!("Discarding stale poll result (generation {})", result.generation);
            return;
        }
        if !result.items.is_empty() {
            tracing::debug!("{} new or updated issues from realtime poll", result.items.len());
        }
        self.poller.follow(&result.next_endpoint);
        self.manager.unshift(result.items);
        if result.links.is_some() && result.links != self.page_links {
            self.set_page_links(result.links);
        }
    }

    fn signal(&self, signal: Signal) {
        send_or_log(&self.signals, signal, "stream signal");
    }
}

impl Drop for IssueStream {
    fn drop(&mut self) {
        if let Some(task) = self.listing.take() {
            task.abort();
        }
    }
}
