use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::api;
use crate::cache::CommentCache;
use crate::config;
use crate::controller::{self, Controller, Status};
use crate::data::{ApiCommentService, CommentService, MockCommentService};
use crate::error::FetchError;
use crate::logging;
use crate::reachability::{Monitor, Probe, TcpProbe, Watcher};
use crate::report;
use crate::route::{self, Route};
use crate::view::{Filter, SortKey};

const TICK: Duration = Duration::from_millis(120);
const DEFAULT_COLUMNS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub url: Option<String>,
    /// Serve built-in sample comments instead of calling the API.
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Filter(Filter),
    Sort(SortKey),
    Page(usize),
    Next,
    Prev,
    Stats,
    Chart,
    Retry,
    Refresh,
    Open(String),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("Type `help` to list commands.".to_string());
    };
    let arg = parts.next();
    match (head.to_ascii_lowercase().as_str(), arg) {
        ("filter" | "f", Some(value)) => value
            .parse::<Filter>()
            .map(Command::Filter)
            .map_err(|err| err.to_string()),
        ("sort" | "s", Some(value)) => value
            .parse::<SortKey>()
            .map(Command::Sort)
            .map_err(|err| err.to_string()),
        ("page" | "g", Some(value)) => value
            .parse::<usize>()
            .map(Command::Page)
            .map_err(|_| format!("not a page number: {value}")),
        ("next" | "n", None) => Ok(Command::Next),
        ("prev" | "p", None) => Ok(Command::Prev),
        ("stats", None) => Ok(Command::Stats),
        ("chart", None) => Ok(Command::Chart),
        ("retry" | "r", None) => Ok(Command::Retry),
        ("refresh", None) => Ok(Command::Refresh),
        ("open" | "o", Some(value)) => Ok(Command::Open(value.to_string())),
        ("help" | "h" | "?", None) => Ok(Command::Help),
        ("quit" | "q" | "exit", None) => Ok(Command::Quit),
        (other, _) => Err(format!("unknown or incomplete command: {other}")),
    }
}

pub fn run(options: RunOptions) -> Result<()> {
    logging::init();

    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            user_agent: cfg.api.user_agent.clone(),
            base_url: Some(cfg.api.base_url.clone()),
            timeout: Some(cfg.api.timeout),
            http_client: None,
        })
        .context("create comments client")?,
    );

    let service: Arc<dyn CommentService> = if options.demo {
        Arc::new(MockCommentService)
    } else {
        Arc::new(ApiCommentService::new(client.clone(), cfg.api.max_results))
    };

    let mut watcher: Option<Watcher> = None;
    let monitor = if cfg.network.probe && !options.demo {
        let probe: Arc<dyn Probe> = Arc::new(
            TcpProbe::for_url(client.base_url(), cfg.network.probe_timeout)
                .context("set up reachability probe")?,
        );
        let monitor = Monitor::detect(probe.as_ref());
        watcher = Some(Watcher::spawn(
            monitor.clone(),
            probe,
            cfg.network.probe_interval,
        ));
        monitor
    } else {
        Monitor::new(true)
    };
    let auto_resume = watcher.is_some();

    let mut controller = Controller::new(
        service,
        monitor,
        controller::Options {
            policy: cfg.fetch.retry_policy(),
            cache: CommentCache::new(cfg.cache.max_entries, cfg.cache.ttl),
        },
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let width = terminal_width();

    let mut route = match options.url.as_deref().map(route::navigate) {
        Some(Ok(route)) => route,
        Some(Err(err)) => {
            println!("{err}");
            Route::Landing
        }
        None => Route::Landing,
    };

    while route == Route::Landing {
        print!("YouTube video URL: ");
        io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("read url from stdin")?;
        match route::navigate(&line) {
            Ok(next) => route = next,
            Err(err) => println!("{err}"),
        }
    }

    if let Some(video_id) = route.video_id() {
        info!("opening comments view - path={}", route.path());
        controller.select(video_id.clone());
        drive(&mut controller, auto_resume);
        show_outcome(&controller, width);
    }

    loop {
        print!("> ");
        io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("read command from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", report::HELP),
            Command::Filter(filter) => {
                controller.set_filter(filter);
                print_page(&controller, width);
            }
            Command::Sort(key) => match controller.set_sort(key) {
                Ok(()) => print_page(&controller, width),
                Err(err) => println!("{err}"),
            },
            Command::Page(page) => {
                controller.set_page(page);
                print_page(&controller, width);
            }
            Command::Next => {
                controller.next_page();
                print_page(&controller, width);
            }
            Command::Prev => {
                controller.prev_page();
                print_page(&controller, width);
            }
            Command::Stats => match controller.dataset() {
                Some(dataset) => println!("{}", report::summary(dataset)),
                None => println!("No comments loaded."),
            },
            Command::Chart => match controller.dataset() {
                Some(dataset) => println!("{}", report::chart_json(dataset)),
                None => println!("No comments loaded."),
            },
            Command::Retry => {
                if controller.retry() {
                    drive(&mut controller, auto_resume);
                    show_outcome(&controller, width);
                } else {
                    println!("Nothing to retry.");
                }
            }
            Command::Refresh => {
                if controller.refresh() {
                    drive(&mut controller, auto_resume);
                    show_outcome(&controller, width);
                } else {
                    println!("Nothing to refresh.");
                }
            }
            Command::Open(url) => match route::navigate(&url) {
                Ok(next) => {
                    if let Some(video_id) = next.video_id() {
                        info!("opening comments view - path={}", next.path());
                        controller.select(video_id.clone());
                        drive(&mut controller, auto_resume);
                        show_outcome(&controller, width);
                    }
                }
                Err(err) => println!("{err}"),
            },
        }
    }

    controller.teardown();
    drop(watcher);
    Ok(())
}

/// Pumps the controller until its session settles. With a live reachability
/// watcher an offline failure keeps waiting for the network to return.
fn drive(controller: &mut Controller, auto_resume: bool) {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(TICK);

    loop {
        controller.poll(Instant::now());
        let status = controller.status();
        let waiting_for_network = auto_resume
            && matches!(
                status,
                Status::Failed {
                    error: FetchError::Offline,
                    ..
                }
            );
        if status.is_terminal() && !waiting_for_network {
            break;
        }
        if waiting_for_network {
            spinner.set_message(report::OFFLINE_BANNER);
        } else {
            spinner.set_message(report::progress_line(&controller.progress()));
        }
        let timeout = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(TICK)
            .min(TICK);
        controller.wait(timeout);
    }
    spinner.finish_and_clear();
}

fn show_outcome(controller: &Controller, width: usize) {
    match controller.status() {
        Status::Succeeded { from_cache } => {
            if let Some(dataset) = controller.dataset() {
                if from_cache {
                    println!("(cached)");
                }
                println!("{}", report::summary(dataset));
            }
            print_page(controller, width);
            println!("Type `help` for commands.");
        }
        Status::Failed { error, .. } => {
            if error.is_connectivity() && !controller.is_reachable() {
                println!("{}", report::OFFLINE_BANNER);
            }
            println!("Error: {}", error.user_message());
            if error.retryable_by_user() {
                println!("Type `retry` to try again.");
            }
        }
        other => warn!("fetch ended in unexpected state - {:?}", other.phase()),
    }
}

fn print_page(controller: &Controller, width: usize) {
    if controller.dataset().is_none() {
        println!("No comments loaded.");
        return;
    }
    print!("{}", report::page(&controller.visible(), controller.view(), width));
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|width| *width >= 40)
        .unwrap_or(DEFAULT_COLUMNS)
}
