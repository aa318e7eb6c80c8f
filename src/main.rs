use anyhow::Result;
use clap::Parser;
use issue_stream::config::{self, preference::FilePreference};
use issue_stream::data::Route;
use issue_stream::integrations::{api, environment::EnvironmentList, ReqwestTransport};
use issue_stream::stream::{FetchState, IssueStream, Signal, StreamEvent, StreamOptions};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "issue-stream")]
#[command(about = "Follow a project's issue stream from the terminal")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    /// Search query (overrides saved searches)
    #[arg(long, short)]
    query: Option<String>,

    /// Saved search to show
    #[arg(long)]
    search_id: Option<String>,

    /// Sort order (date, new, priority, freq)
    #[arg(long)]
    sort: Option<String>,

    /// Stats period (24h or 14d)
    #[arg(long)]
    stats_period: Option<String>,

    /// Pagination cursor to start from
    #[arg(long)]
    cursor: Option<String>,

    /// Active environment
    #[arg(long, short)]
    environment: Option<String>,

    /// Turn realtime updates on or off (remembered)
    #[arg(long)]
    realtime: Option<bool>,

    /// Print the first page and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn route(&self) -> Route {
        let mut route = Route::new();
        if let Some(id) = &self.search_id {
            route = route.with_search_id(id);
        }
        let params = [
            ("query", &self.query),
            ("sort", &self.sort),
            ("statsPeriod", &self.stats_period),
            ("cursor", &self.cursor),
        ];
        for (key, value) in params {
            if let Some(value) = value {
                route = route.with_param(key, value);
            }
        }
        route
    }
}

enum Action {
    Event(Option<StreamEvent>),
    Signal(Option<Signal>),
    IdsChanged,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("issue_stream=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.init {
        config::init_wizard().await?;
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let options = StreamOptions::from_config(&config);
    let transport = Arc::new(ReqwestTransport::new(
        config.api.base_url.clone(),
        config.api.token.clone(),
    ));

    let environments = match api::fetch_environments(transport.as_ref(), &options.project).await {
        Ok(envs) => envs,
        Err(e) => {
            tracing::warn!("Failed to fetch environments: {}", e);
            Vec::new()
        }
    };
    let environments = EnvironmentList::new(environments).with_active(args.environment.as_deref());
    if args.environment.is_some() && environments.all().is_empty() {
        tracing::warn!("No environments known for this project, ignoring --environment");
    }

    let preference = FilePreference::new(config::preference_path()?);

    let (mut stream, mut signals) = IssueStream::new(
        options,
        transport,
        Box::new(environments),
        Box::new(preference),
    );
    if let Some(realtime) = args.realtime {
        stream.set_realtime(realtime);
    }

    let mut ids = stream.subscribe_ids();
    let mut shown: Vec<String> = Vec::new();
    stream.start(args.route());

    loop {
        let action = tokio::select! {
            event = stream.next_event() => Action::Event(event),
            signal = signals.recv() => Action::Signal(signal),
            changed = ids.changed() => match changed {
                Ok(()) => Action::IdsChanged,
                Err(_) => Action::Quit,
            },
            _ = tokio::signal::ctrl_c() => Action::Quit,
        };

        match action {
            Action::Event(Some(event)) => stream.handle_event(event),
            Action::Event(None) | Action::Signal(None) | Action::Quit => break,
            Action::Signal(Some(signal)) => {
                if handle_signal(&stream, signal, args.once, &mut shown) {
                    break;
                }
            }
            Action::IdsChanged => {
                // Realtime arrivals; full page loads are printed with their summary
                if !stream.is_loading() && stream.ids() != shown.as_slice() {
                    print_items(&stream);
                    shown = stream.ids().to_vec();
                }
            }
        }
    }

    stream.shutdown();
    Ok(())
}

/// Returns true when the CLI should exit
fn handle_signal(stream: &IssueStream, signal: Signal, once: bool, shown: &mut Vec<String>) -> bool {
    match signal {
        Signal::Navigate(nav) => {
            println!("-> {}", nav.to_url());
            false
        }
        Signal::DirectHit(nav) => {
            println!("Direct hit: {}", nav.to_url());
            true
        }
        Signal::ProcessingIssues(pi) => {
            println!(
                "! {} issues blocking event processing, {} pending reprocessing",
                pi.num_issues, pi.resolveable_issues
            );
            false
        }
        Signal::StateChanged => match stream.fetch_state() {
            FetchState::Loaded => {
                print_summary(stream);
                *shown = stream.ids().to_vec();
                once
            }
            FetchState::Errored(msg) => {
                eprintln!("Error: {}", msg);
                once
            }
            FetchState::Idle | FetchState::Loading => false,
        },
    }
}

fn print_summary(stream: &IssueStream) {
    let effective = stream.effective();
    let search = effective
        .search_id
        .as_deref()
        .map(|id| format!(" (saved search {})", id))
        .unwrap_or_default();
    println!(
        "query: {:?}{} | sort: {} | stats: {} | {} of {} hits | realtime: {}",
        effective.query,
        search,
        effective.sort,
        effective.stats_period,
        stream.ids().len(),
        stream.query_count().unwrap_or(0),
        if stream.realtime_active() { "on" } else { "off" }
    );
    print_items(stream);
    if let Some(links) = stream.links() {
        if !stream.all_results_visible() {
            println!(
                "prev: {} | next: {}",
                if links.previous.has_results { links.previous.cursor.as_str() } else { "-" },
                if links.next.has_results { links.next.cursor.as_str() } else { "-" }
            );
        }
    }
}

fn print_items(stream: &IssueStream) {
    let items = stream.items();
    if items.is_empty() {
        println!("  (no issues match)");
        return;
    }
    for issue in items {
        let last_seen = issue
            .last_seen
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {:<14} {:>7} {:<16} {}",
            issue.short_id.as_deref().unwrap_or(&issue.id),
            issue.count,
            last_seen,
            issue.title
        );
    }
}
