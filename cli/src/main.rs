use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crawlsync::{load_or_default, StoreChange, SyncEngine, SyncError};

/// Set to `json` for machine-readable log lines.
const LOG_FORMAT_ENV: &str = "CRAWLSYNC_LOG_FORMAT";

#[derive(Parser, Debug)]
#[command(name = "crawlsync", version, about = "Mirror live crawl job state from a crawl service")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load the job table once, print the summary and exit
    #[arg(long)]
    once: bool,

    /// Print summaries as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let fmt_layer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    // The library logs through the `log` facade
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn print_summary(engine: &SyncEngine, as_json: bool) {
    let snapshot = engine.snapshot();
    if as_json {
        let line = serde_json::json!({
            "revision": snapshot.revision,
            "summary": snapshot.summary,
        });
        println!("{}", line);
    } else {
        println!("[rev {}] {}", snapshot.revision, snapshot.summary);
    }
}

async fn run(args: Args) -> Result<(), SyncError> {
    let config = load_or_default(args.config.as_deref())?;
    info!(
        api = %config.api_base_url,
        stream = %config.stream_url,
        "Starting crawlsync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let engine = SyncEngine::from_config(&config)?;

    match engine.refresh().await {
        Ok(_) => print_summary(&engine, args.json),
        // Without a stream to fall back on there is nothing left to show
        Err(e) if args.once => return Err(e.into()),
        Err(e) => warn!("Initial load failed, waiting for stream updates: {}", e),
    }

    if args.once {
        return Ok(());
    }

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut changes = engine.subscribe();
    let mut state_rx = engine.subscribe_state();
    engine.start();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("Shutdown requested");
                break;
            }
            change = changes.recv() => match change {
                Ok(StoreChange::Upserted { id, status }) => {
                    if status.is_finished() {
                        info!(id, %status, "Job finished");
                    } else {
                        tracing::debug!(id, %status, "Job updated");
                    }
                    print_summary(&engine, args.json);
                }
                Ok(_) => print_summary(&engine, args.json),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} change notifications", skipped);
                    print_summary(&engine, args.json);
                }
                Err(RecvError::Closed) => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!("Stream {}", state);
            }
        }
    }

    engine.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
