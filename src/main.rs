mod settings;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use logtap_client::{
    CommandStatusChecker, CommandTokenProvider, LogStreamer, SourceFilter, StreamConfig,
    StreamContext, StreamError,
};
use logtap_types::{
    ColorMode, DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_PREFETCH, DEFAULT_TAIL,
    OutputMode,
};

use crate::settings::Settings;

/// Logtap - tail and follow a live log feed over a WebSocket
#[derive(Parser, Debug)]
#[command(name = "logtap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stream endpoint (ws:// or wss://), optional if set in the config file
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Search filter passed to the server
    #[arg(long, default_value = "")]
    filter: String,

    /// Only show entries from these sources (repeatable or comma separated)
    #[arg(long = "source", value_name = "SOURCE", value_delimiter = ',')]
    sources: Vec<String>,

    /// Number of historical lines to show
    #[arg(short = 'n', long, value_name = "LINES")]
    tail: Option<usize>,

    /// Keep streaming and reconnect until interrupted
    #[arg(short, long)]
    follow: bool,

    /// Milliseconds to wait for the tail before showing what arrived
    #[arg(long, value_name = "MS")]
    prefetch: Option<u64>,

    /// Bearer token for the stream
    #[arg(long)]
    token: Option<String>,

    /// Shell command printing a fresh token, run when the token is missing or refused
    #[arg(long, value_name = "COMMAND")]
    token_command: Option<String>,

    /// Shell command that exits non-zero once the app is gone
    #[arg(long, value_name = "COMMAND")]
    status_command: Option<String>,

    /// Origin header sent with the handshake
    #[arg(long)]
    origin: Option<String>,

    /// Print one JSON object per line
    #[arg(long)]
    json: bool,

    /// Colorize output: auto, always or never
    #[arg(long, value_name = "WHEN")]
    color: Option<ColorMode>,

    /// Show timestamps in local time instead of UTC
    #[arg(long)]
    local_time: bool,

    /// Config file (defaults to logtap/config.toml in the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr so they never mix with log lines on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(log_level(args.verbose).into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

async fn run(args: Args) -> Result<()> {
    let settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    let config = build_config(&args, settings, io::stdout().is_terminal())?
        .with_writer(io::stdout());
    debug!(?config, "Starting log stream");

    let cancel = CancellationToken::new();
    let ctx = StreamContext::new(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing stream");
            cancel.cancel();
        }
    });

    let mut streamer = LogStreamer::new(config)?;
    match streamer.run(&ctx).await {
        // Interrupting a follow session is how it normally ends
        Ok(()) | Err(StreamError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Merge command line and config file into a stream configuration.
/// The writer is left for the caller to attach.
fn build_config(args: &Args, settings: Settings, stdout_is_terminal: bool) -> Result<StreamConfig> {
    let Some(url) = args.url.clone().or(settings.url) else {
        bail!("no stream URL given: pass one as an argument or set `url` in the config file");
    };

    let output = if args.json {
        OutputMode::Json
    } else {
        settings.output.unwrap_or_default()
    };
    let color = args.color.or(settings.color).unwrap_or_default();
    let sources = if args.sources.is_empty() {
        settings.sources
    } else {
        args.sources.clone()
    };
    let prefetch = args
        .prefetch
        .or(settings.prefetch_ms)
        .map_or(DEFAULT_PREFETCH, Duration::from_millis);
    let backoff_initial = settings
        .backoff_initial_ms
        .map_or(DEFAULT_BACKOFF_INITIAL, Duration::from_millis);
    let backoff_max = settings
        .backoff_max_ms
        .map_or(DEFAULT_BACKOFF_MAX, Duration::from_millis);

    let mut config = StreamConfig::new(url)
        .with_filter(args.filter.clone())
        .with_sources(SourceFilter::new(sources))
        .with_tail(args.tail.or(settings.tail).unwrap_or(DEFAULT_TAIL))
        .with_follow(args.follow)
        .with_prefetch(prefetch)
        .with_output(output)
        .with_backoff(backoff_initial, backoff_max);
    config.colorize = output == OutputMode::Text && color.enabled(stdout_is_terminal);
    config.local_time = args.local_time || settings.local_time.unwrap_or(false);

    if let Some(origin) = args.origin.clone().or(settings.origin) {
        config = config.with_origin(origin);
    }
    if let Some(token) = &args.token {
        config = config.with_token(token.clone());
    }
    if let Some(command) = args.token_command.clone().or(settings.token_command) {
        config = config.with_token_provider(Arc::new(CommandTokenProvider::new(command)));
    }
    if let Some(command) = args.status_command.clone().or(settings.status_command) {
        config = config.with_status_checker(Arc::new(CommandStatusChecker::new(command)));
    }

    Ok(config)
}
