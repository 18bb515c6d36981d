//! PixelPulse CLI
//!
//! Replays recorded page signals through the sensors and computes insights
//! over stored events.

use chrono::Utc;
use clap::{Parser, Subcommand};
use pixelpulse::{
    collector::{channel, Event, PageRuntime, TimedSignal, WireEvent, DEFAULT_CHANNEL_CAPACITY},
    config::Config,
    insights::{Insight, InsightEngine},
    spawn_forwarder,
    transparency::{create_shared_log_with_persistence, TransparencyLog},
    MemoryTransport, TransportConfig, PRIVACY_DECLARATION, VERSION,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(feature = "http")]
use pixelpulse::HttpTransport;

#[derive(Parser)]
#[command(name = "pixelpulse")]
#[command(version = VERSION)]
#[command(about = "Behavioral analytics sensors and insight engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed recorded page signals through the sensors
    Replay {
        /// JSON lines file of timed page signals
        #[arg(long)]
        signals: PathBuf,

        /// Page URL at load time
        #[arg(long)]
        url: String,

        /// Time of page unload in ms (defaults to the last signal)
        #[arg(long)]
        end: Option<i64>,

        /// POST events to a collector instead of printing them
        #[arg(long)]
        post: bool,

        /// Collector endpoint (implies --post)
        #[arg(long)]
        endpoint: Option<String>,

        /// URL of the loading script, used to derive the endpoint
        #[arg(long)]
        script_src: Option<String>,

        /// Project token
        #[arg(long)]
        token: Option<String>,

        /// Write wire events to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Compute insights over stored events
    Insights {
        /// JSON array or JSON lines file of events
        #[arg(long)]
        events: PathBuf,

        /// Reference time in ms since epoch (defaults to now)
        #[arg(long)]
        now: Option<i64>,

        /// Print insights as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

/// Replay and input errors.
#[derive(Debug)]
enum ReplayError {
    Io(String),
    Parse { line: usize, message: String },
    Transport(String),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Io(e) => write!(f, "IO error: {e}"),
            ReplayError::Parse { line, message } => {
                write!(f, "Parse error on line {line}: {message}")
            }
            ReplayError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for ReplayError {}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            signals,
            url,
            end,
            post,
            endpoint,
            script_src,
            token,
            output,
        } => cmd_replay(ReplayArgs {
            signals,
            url,
            end,
            post,
            endpoint,
            script_src,
            token,
            output,
        }),
        Commands::Insights { events, now, json } => cmd_insights(&events, now, json),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Privacy => {
            cmd_privacy();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

struct ReplayArgs {
    signals: PathBuf,
    url: String,
    end: Option<i64>,
    post: bool,
    endpoint: Option<String>,
    script_src: Option<String>,
    token: Option<String>,
    output: Option<PathBuf>,
}

fn cmd_replay(args: ReplayArgs) -> Result<(), ReplayError> {
    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        tracing::warn!(error = %e, "could not create data directory");
    }

    let signals = read_signals(&args.signals)?;
    let start = signals.first().map_or(0, |s| s.at);
    let end = args
        .end
        .or_else(|| signals.last().map(|s| s.at))
        .unwrap_or(start);
    let token = args.token.or_else(|| config.token.clone());

    tracing::info!(signals = signals.len(), url = %args.url, "replaying page signals");

    let log = create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let memory = Arc::new(MemoryTransport::new(token.clone()));
    let (tx, rx) = channel(DEFAULT_CHANNEL_CAPACITY);
    let forwarder = spawn_forwarder(rx, memory.clone(), log.clone());

    let mut runtime = PageRuntime::new(&config.sensors, args.url.clone(), token.clone(), tx)
        .with_log(log.clone());
    runtime.start(start);
    for signal in &signals {
        runtime.handle_timed(signal);
    }
    runtime.teardown(end.max(runtime.now()));
    drop(runtime);
    log.record_page_load();

    let forwarded = forwarder
        .join()
        .map_err(|_| ReplayError::Transport("forwarder thread panicked".to_string()))?;
    if let Err(e) = log.save() {
        tracing::warn!(error = %e, "could not save transparency stats");
    }

    let events = memory.take();
    tracing::info!(events = forwarded, "sensors finished");

    if args.post || args.endpoint.is_some() {
        let explicit = args.endpoint.as_deref().or(config.endpoint.as_deref());
        let endpoint =
            TransportConfig::resolve(explicit, args.script_src.as_deref(), &args.url)
                .map_err(|e| ReplayError::Transport(e.to_string()))?;
        return post_events(TransportConfig::new(endpoint, token), &events);
    }

    write_events(&events, args.output.as_deref())
}

fn read_signals(path: &Path) -> Result<Vec<TimedSignal>, ReplayError> {
    let content = std::fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;
    let mut signals = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let signal: TimedSignal = serde_json::from_str(line).map_err(|e| ReplayError::Parse {
            line: i + 1,
            message: e.to_string(),
        })?;
        signals.push(signal);
    }
    signals.sort_by_key(|s| s.at);
    Ok(signals)
}

fn write_events(events: &[WireEvent], output: Option<&Path>) -> Result<(), ReplayError> {
    let mut lines = String::new();
    for event in events {
        let line =
            serde_json::to_string(event).map_err(|e| ReplayError::Transport(e.to_string()))?;
        lines.push_str(&line);
        lines.push('\n');
    }

    match output {
        Some(path) => {
            std::fs::write(path, lines).map_err(|e| ReplayError::Io(e.to_string()))?;
            println!("Wrote {} events to {:?}", events.len(), path);
        }
        None => {
            std::io::stdout()
                .write_all(lines.as_bytes())
                .map_err(|e| ReplayError::Io(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(feature = "http")]
fn post_events(config: TransportConfig, events: &[WireEvent]) -> Result<(), ReplayError> {
    let endpoint = config.endpoint.clone();
    let transport = HttpTransport::new(config).map_err(|e| ReplayError::Transport(e.to_string()))?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ReplayError::Transport(format!("Failed to create runtime: {e}")))?;

    let failed = runtime.block_on(async {
        let mut failed = 0usize;
        for event in events {
            if let Err(e) = transport.deliver(event).await {
                tracing::debug!(error = %e, "event delivery failed");
                failed += 1;
            }
        }
        failed
    });

    println!(
        "Posted {} events to {endpoint} ({failed} failed)",
        events.len() - failed
    );
    Ok(())
}

#[cfg(not(feature = "http"))]
fn post_events(_config: TransportConfig, _events: &[WireEvent]) -> Result<(), ReplayError> {
    Err(ReplayError::Transport(
        "HTTP delivery requires the `http` feature".to_string(),
    ))
}

fn cmd_insights(path: &Path, now: Option<i64>, as_json: bool) -> Result<(), ReplayError> {
    let config = Config::load().unwrap_or_default();
    let events = read_events(path)?;
    let now = now.unwrap_or_else(|| Utc::now().timestamp_millis());

    tracing::info!(events = events.len(), "computing insights");
    let insights = InsightEngine::new(config.insights).compute(&events, now);

    if as_json {
        let json = serde_json::to_string_pretty(&insights)
            .map_err(|e| ReplayError::Transport(e.to_string()))?;
        println!("{json}");
    } else {
        print_insights(&insights);
    }
    Ok(())
}

/// Accepts a JSON array, or one event per line. Stored events and wire
/// events are both understood.
fn read_events(path: &Path) -> Result<Vec<Event>, ReplayError> {
    let content = std::fs::read_to_string(path).map_err(|e| ReplayError::Io(e.to_string()))?;

    if content.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| ReplayError::Parse {
                line: 1,
                message: e.to_string(),
            })?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, v)| parse_event(v, i + 1))
            .collect();
    }

    let mut events = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| ReplayError::Parse {
                line: i + 1,
                message: e.to_string(),
            })?;
        events.push(parse_event(value, i + 1)?);
    }
    Ok(events)
}

fn parse_event(value: serde_json::Value, line: usize) -> Result<Event, ReplayError> {
    let parsed = if value.get("t").is_some() {
        serde_json::from_value::<WireEvent>(value).map(WireEvent::into_event)
    } else {
        serde_json::from_value::<Event>(value)
    };
    parsed.map_err(|e| ReplayError::Parse {
        line,
        message: e.to_string(),
    })
}

fn print_insights(insights: &[Insight]) {
    if insights.is_empty() {
        println!("No insights. Nothing crossed a threshold.");
        return;
    }

    for insight in insights {
        println!("[{}] {}", insight.severity.as_str().to_uppercase(), insight.title);
        println!("  {}", insight.summary);
        println!("  Action: {}", insight.action);
        println!();
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("PixelPulse Status");
    println!("=================");
    println!();

    println!("Configuration:");
    println!(
        "  Endpoint: {}",
        config.endpoint.as_deref().unwrap_or("(derived from page origin)")
    );
    println!(
        "  Project token: {}",
        if config.token.is_some() { "set" } else { "not set" }
    );
    println!("  Drop-off timeout: {}ms", config.sensors.dropoff_timeout.as_millis());
    println!("  Rage window: {}ms", config.sensors.rage_window.as_millis());
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        let log = TransparencyLog::with_persistence(stats_path);
        println!("{}", log.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
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
