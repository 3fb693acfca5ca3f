//! courier: command-line front end for a file-backed offline request queue.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use courier_core::app::SkipReason;
use courier_core::impls::{FileStorage, default_probe};
use courier_core::ports::ConnectivityProbe;
use courier_core::{
    HttpMethod, PassOutcome, Priority, QueueConfig, QueueEvent, QueueManager,
    QueueManagerBuilder, RequestId, RequestSpec,
};

/// courier: durable offline HTTP request queue
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Queue HTTP requests while offline and replay them when back online")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the queue snapshot
    #[arg(short, long, default_value = ".courier")]
    state_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a request to the queue
    Enqueue {
        /// Absolute URL, or `/path` joined onto `base_url`
        endpoint: String,

        #[arg(short, long, default_value = "POST")]
        method: HttpMethod,

        #[arg(short, long, default_value = "normal")]
        priority: Priority,

        /// Header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// JSON body
        #[arg(short, long)]
        body: Option<String>,

        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Print the queue in processing order
    List,

    /// Print size, connectivity and the oldest request
    Status,

    /// Remove one request
    Dequeue { id: RequestId },

    /// Remove every request
    Clear,

    /// Run one processing pass now
    Flush,

    /// Keep processing until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let config = match &args.config {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    };
    let storage = FileStorage::open(&args.state_dir).await?;
    info!(state_dir = %storage.dir().display(), "using state directory");

    let probe = default_probe(&config);
    let manager = QueueManagerBuilder::new()
        .config(config)
        .storage(Arc::new(storage))
        .probe(Arc::clone(&probe))
        .on_error(|request, error| {
            warn!(
                request_id = %request.id,
                endpoint = %request.endpoint,
                %error,
                "request dropped"
            );
        })
        .build()?;

    match args.command {
        Command::Enqueue {
            endpoint,
            method,
            priority,
            headers,
            body,
            max_retries,
        } => {
            let mut spec = RequestSpec::new(method, endpoint).with_priority(priority);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("header {header:?} is not `Name: value`"))?;
                spec = spec.with_header(name.trim(), value.trim());
            }
            if let Some(body) = body {
                spec = spec.with_body(serde_json::from_str(&body)?);
            }
            if let Some(n) = max_retries {
                spec = spec.with_max_retries(n);
            }
            let id = manager.enqueue(spec).await?;
            println!("{id}");
        }
        Command::List => {
            manager.restore().await;
            println!("{}", serde_json::to_string_pretty(&manager.get_queue())?);
        }
        Command::Status => {
            manager.restore().await;
            let mut status = manager.get_queue_status();
            status.is_online = probe.is_reachable().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Dequeue { id } => {
            let removed = manager.dequeue(&id).await;
            println!("{removed}");
        }
        Command::Clear => {
            let removed = manager.clear_queue().await;
            println!("{removed}");
        }
        Command::Flush => flush(&manager).await?,
        Command::Run => run(&manager).await?,
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One pass, then exit. A pass started by the reconnect during `init` counts.
async fn flush(manager: &QueueManager) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = manager.subscribe();
    manager.init().await;

    let summary = match manager.process_queue().await {
        PassOutcome::Completed { summary } => Some(summary),
        PassOutcome::Skipped {
            reason: SkipReason::AlreadyRunning,
        } => loop {
            if let QueueEvent::PassCompleted { summary } = events.recv().await? {
                break Some(summary);
            }
        },
        PassOutcome::Skipped { reason } => {
            info!(?reason, "nothing to flush");
            None
        }
    };
    if let Some(summary) = summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    manager.dispose().await;
    Ok(())
}

async fn run(manager: &QueueManager) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = manager.subscribe();
    manager.init().await;
    info!(
        size = manager.get_queue_status().size,
        "processing; press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    manager.dispose().await;
    Ok(())
}
