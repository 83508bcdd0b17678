//! Update Limit Notifier CLI
//!
//! Tracks posting sections for one account and warns before the update limit.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use update_limit_notifier::{
    activity::create_shared_log_with_persistence,
    config::Config,
    core::SectionFinder,
    provider::{AccountIdentity, StaticHistory, StdoutNotifyAction},
    Controller, HistoryProvider, NotifyAction, Post, TrackerEvent, VERSION,
};

#[cfg(feature = "webhook")]
use update_limit_notifier::{WebhookConfig, WebhookNotifyAction};

#[derive(Parser)]
#[command(name = "update-limit")]
#[command(version = VERSION)]
#[command(about = "Warns an account before it hits its posting limit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the current section from a history file
    Find {
        /// JSON array or JSON lines of posts
        #[arg(long)]
        history: PathBuf,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        now: Option<String>,

        /// Size of one history page
        #[arg(long, default_value = "200")]
        page_size: usize,
    },

    /// Track posts read from stdin (one JSON post per line)
    Run {
        /// History to bootstrap from
        #[arg(long)]
        history: Option<PathBuf>,

        /// Tracked account (overrides config)
        #[arg(long)]
        account: Option<String>,

        /// Notify threshold (overrides config)
        #[arg(long)]
        threshold: Option<usize>,

        /// Send warnings to this webhook instead of stdout (requires webhook feature)
        #[arg(long)]
        webhook: Option<String>,

        /// Bearer token for the webhook
        #[arg(long)]
        webhook_token: Option<String>,
    },

    /// Bootstrap from a history file and show the section status
    Status {
        /// History to bootstrap from
        #[arg(long)]
        history: PathBuf,

        /// Tracked account (overrides config)
        #[arg(long)]
        account: Option<String>,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config,

    /// Change configuration values
    Set {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        threshold: Option<usize>,

        /// Message template ({count}, {release}, {annotation})
        #[arg(long)]
        template: Option<String>,

        /// strftime format of the release time
        #[arg(long)]
        time_format: Option<String>,

        /// Text appended when the section start is estimated
        #[arg(long)]
        annotation: Option<String>,

        /// IANA time zone, e.g. Asia/Tokyo
        #[arg(long)]
        time_zone: Option<String>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Find {
            history,
            now,
            page_size,
        } => {
            cmd_find(&history, now.as_deref(), page_size);
        }
        Commands::Run {
            history,
            account,
            threshold,
            webhook,
            webhook_token,
        } => {
            cmd_run(history, account, threshold, webhook, webhook_token);
        }
        Commands::Status {
            history,
            account,
            json,
        } => {
            cmd_status(&history, account, json);
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Set {
            account,
            threshold,
            template,
            time_format,
            annotation,
            time_zone,
        } => {
            cmd_set(account, threshold, template, time_format, annotation, time_zone);
        }
    }
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` overrides.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_find(history: &Path, now: Option<&str>, page_size: usize) {
    let history = load_history(Some(history));

    let now = match now {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                eprintln!("Error: invalid --now {raw:?}: {e}");
                std::process::exit(1);
            }
        },
        None => Utc::now(),
    };

    if page_size == 0 {
        eprintln!("Error: --page-size must be greater than zero");
        std::process::exit(1);
    }

    let finder = SectionFinder::new(page_size);
    let page = match history.fetch_recent(page_size, 0) {
        Ok(page) => page,
        Err(e) => {
            eprintln!("Error reading history: {e}");
            std::process::exit(1);
        }
    };
    let estimate = finder.find(&page, now);
    let release = estimate.section.release_at();

    let mut post_ids: Vec<_> = estimate.posts.keys().copied().collect();
    post_ids.sort_unstable();

    let output = serde_json::json!({
        "now": now,
        "section": estimate.section,
        "release_instant": release,
        "post_count": estimate.posts.len(),
        "post_ids": post_ids,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_run(
    history: Option<PathBuf>,
    account: Option<String>,
    threshold: Option<usize>,
    webhook: Option<String>,
    webhook_token: Option<String>,
) {
    println!("Update Limit Notifier v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    let Some(account) = account.or_else(|| config.account.clone()) else {
        eprintln!("Error: no account configured.");
        eprintln!("Pass --account or run 'update-limit set --account <handle>'.");
        std::process::exit(1);
    };

    let mut settings = config.notify.clone();
    if let Some(threshold) = threshold {
        settings.notify_threshold = threshold;
    }

    let action = create_notify_action(webhook, webhook_token);
    let identity = Arc::new(AccountIdentity::new(account.as_str()));
    let activity = create_shared_log_with_persistence(config.activity_path());

    let controller = match Controller::builder(
        Arc::new(load_history(history.as_deref())),
        identity.clone(),
        action,
    )
    .settings(settings.clone())
    .activity_log(activity.clone())
    .build()
    {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("  Account: @{account}");
    println!("  Notify threshold: {}", settings.notify_threshold);
    println!("  Time zone: {}", settings.time_zone);
    println!();
    println!("Reading posts from stdin, press Ctrl+C to stop");
    println!();

    let events = controller.subscribe();
    thread::spawn(move || {
        for event in events {
            print_event(&event);
        }
    });

    if let Err(e) = controller.start_blocking() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    println!("{}", controller.snapshot().summary());
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let (line_tx, line_rx) = bounded::<String>(256);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    while running.load(Ordering::SeqCst) {
        match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => handle_line(&controller, &identity, line.trim()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    println!("Stopping...");
    println!("{}", controller.snapshot().summary());
    controller.stop();

    if let Err(e) = activity.save() {
        eprintln!("Warning: could not save activity counters: {e}");
    }
    println!();
    println!("{}", activity.summary());
}

/// A post as JSON, or one of the interactive commands.
fn handle_line(controller: &Controller, identity: &AccountIdentity, line: &str) {
    if line.is_empty() {
        return;
    }
    if line.starts_with('{') {
        match serde_json::from_str::<Post>(line) {
            Ok(post) => controller.on_external_post(&post),
            Err(e) => eprintln!("Warning: ignoring malformed post: {e}"),
        }
        return;
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim);

    match (command, arg) {
        ("status", _) => println!("{}", controller.snapshot().summary()),
        ("restart", _) => {
            controller.restart();
        }
        ("account", Some(handle)) if !handle.is_empty() => {
            identity.switch_to(handle);
            controller.on_account_changed();
            println!("Now tracking @{}", identity.handle());
        }
        ("threshold", Some(raw)) => match raw.parse::<usize>() {
            Ok(threshold) => {
                let mut settings = controller.settings();
                settings.notify_threshold = threshold;
                match controller.change_settings(settings) {
                    Ok(()) => println!("Notify threshold set to {threshold}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(_) => eprintln!("Error: threshold must be a number"),
        },
        _ => eprintln!("Unknown command {line:?} (status, restart, account <handle>, threshold <n>)"),
    }
}

fn print_event(event: &TrackerEvent) {
    let at = Utc::now().format("%H:%M:%S");
    match event {
        TrackerEvent::BootstrapSucceeded {
            accurate,
            post_count,
            ..
        } => {
            println!(
                "[{at}] Section found: {post_count} posts{}",
                if *accurate { "" } else { " (estimated start)" }
            );
        }
        TrackerEvent::BootstrapFailed { error, .. } => {
            println!("[{at}] History scan failed: {error}");
        }
        TrackerEvent::Notified {
            post_count,
            message,
            ..
        } => {
            println!("[{at}] Warning sent at {post_count} posts: {message}");
        }
        TrackerEvent::NotifyFailed { error, .. } => {
            println!("[{at}] Warning could not be sent: {error}");
        }
    }
}

fn cmd_status(history: &Path, account: Option<String>, json: bool) {
    let config = Config::load().unwrap_or_default();
    let Some(account) = account.or(config.account) else {
        eprintln!("Error: no account configured.");
        std::process::exit(1);
    };

    let controller = match Controller::builder(
        Arc::new(load_history(Some(history))),
        Arc::new(AccountIdentity::new(account)),
        Arc::new(StdoutNotifyAction),
    )
    .settings(config.notify)
    .build()
    {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.start_blocking() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    let status = controller.snapshot();
    controller.stop();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "Error".to_string())
        );
    } else {
        println!("{}", status.summary());
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_set(
    account: Option<String>,
    threshold: Option<usize>,
    template: Option<String>,
    time_format: Option<String>,
    annotation: Option<String>,
    time_zone: Option<String>,
) {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };

    if let Some(account) = account {
        config.account = Some(account.trim_start_matches('@').to_string());
    }
    if let Some(threshold) = threshold {
        config.notify.notify_threshold = threshold;
    }
    if let Some(template) = template {
        config.notify.message_template = template;
    }
    if let Some(time_format) = time_format {
        config.notify.release_time_format = time_format;
    }
    if let Some(annotation) = annotation {
        config.notify.inaccuracy_annotation = annotation;
    }
    if let Some(time_zone) = time_zone {
        config.notify.time_zone = time_zone;
    }

    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Configuration saved to {:?}", Config::config_path());
}

fn load_history(path: Option<&Path>) -> StaticHistory {
    let Some(path) = path else {
        return StaticHistory::default();
    };
    match StaticHistory::from_file(path) {
        Ok(history) => history,
        Err(e) => {
            eprintln!("Error loading history: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "webhook")]
fn create_notify_action(url: Option<String>, token: Option<String>) -> Arc<dyn NotifyAction> {
    let Some(url) = url else {
        return Arc::new(StdoutNotifyAction);
    };

    let mut config = WebhookConfig::new(url);
    if let Some(token) = token {
        config = config.with_token(token);
    }
    match WebhookNotifyAction::new(config) {
        Ok(action) => Arc::new(action),
        Err(e) => {
            eprintln!("Error: webhook initialization failed: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "webhook"))]
fn create_notify_action(url: Option<String>, _token: Option<String>) -> Arc<dyn NotifyAction> {
    if url.is_some() {
        eprintln!("Warning: --webhook ignored (webhook feature not enabled at compile time)");
    }
    Arc::new(StdoutNotifyAction)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }
}
