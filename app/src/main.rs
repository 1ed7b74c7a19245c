// rdslink -- bridge a now-playing track queue to an RDS encoder.
//
// Usage:
//   rdslink run
//   rdslink --config /etc/rdslink.toml --log-format json run
//   rdslink compose --artist "Owl City" --title "Fireflies"
//   rdslink send --artist "Owl City" --title "Fireflies"
//   rdslink monitor --duration 60
//   rdslink check-config

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use rdslink::notify::{DiscordWebhookSink, LogSink, NotificationSink, Notifier};
use rdslink::queue::MemoryPreview;
use rdslink::{Config, EncoderEvent, Outcome, Pipeline};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "rdslink=info,rdslink_encoder=info,rdslink_app=info";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Bridge a now-playing track queue to an RDS encoder.
#[derive(Parser)]
#[command(name = "rdslink", version, about)]
struct Cli {
    /// Config file (default: ./rdslink.toml when present).
    #[arg(long, env = "RDSLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the track queue and drive the encoder until stopped.
    Run,

    /// Show the TEXT and RT+TAG lines for a track without sending them.
    Compose {
        #[arg(long)]
        artist: String,
        #[arg(long)]
        title: String,
        /// Track length in seconds.
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Send one track to the encoder, bypassing the queue.
    Send {
        #[arg(long)]
        artist: String,
        #[arg(long)]
        title: String,
        /// Seconds to wait for the encoder before giving up.
        #[arg(long, default_value_t = 10)]
        wait: u64,
    },

    /// Connect to the encoder and print link events.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Validate the configuration and print it with secrets redacted.
    CheckConfig,
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

fn notification_sinks(config: &Config) -> Result<Vec<Arc<dyn NotificationSink>>> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.notify.discord_webhook_url {
        sinks.push(Arc::new(
            DiscordWebhookSink::new(url).context("creating Discord webhook client")?,
        ));
        info!("Discord notifications enabled");
    }
    Ok(sinks)
}

/// Log link events until the link goes away.
fn spawn_event_logger(mut events: broadcast::Receiver<EncoderEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EncoderEvent::Connected { endpoint }) => {
                    info!(%endpoint, "Encoder connected")
                }
                Ok(EncoderEvent::Disconnected) => warn!("Encoder disconnected"),
                Ok(EncoderEvent::Reconnecting { attempt, delay }) => {
                    info!(attempt, ?delay, "Reconnecting to encoder")
                }
                Ok(EncoderEvent::Accepted { command }) => debug!(%command, "Encoder accepted"),
                Ok(EncoderEvent::Rejected { command, response }) => {
                    warn!(%command, %response, "Encoder rejected")
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(missed = n, "Event logger lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting rdslink");

    let (notifier, notify_task) =
        Notifier::spawn(notification_sinks(&config)?, config.notify.queue_capacity);

    let link = config
        .encoder
        .builder()
        .build()
        .context("starting encoder link")?;
    let event_logger = spawn_event_logger(link.subscribe());

    let (mut source, preview) = rdslink::amqp::connect(&config.queue, &config.preview)
        .await
        .context("connecting to message broker")?;

    let pipeline = Pipeline::from_config(&config, link, Arc::new(preview), notifier)
        .context("building pipeline")?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let result = pipeline.run(&mut source, cancel.clone()).await;

    pipeline.shutdown().await;
    event_logger.abort();
    if tokio::time::timeout(Duration::from_secs(5), notify_task)
        .await
        .is_err()
    {
        warn!("Pending notifications abandoned at shutdown");
    }

    result.context("pipeline failed")?;
    if !cancel.is_cancelled() {
        bail!("track queue closed unexpectedly");
    }
    info!("rdslink stopped");
    Ok(())
}

fn cmd_compose(config: &Config, artist: &str, title: &str, duration: Option<u64>) -> Result<()> {
    let composer = config.composer()?;
    let encoder = config.rt_plus_encoder()?;

    let msg = composer.compose(artist, title);
    let timeout = match (config.rt_plus.timeout_from_duration, duration) {
        (true, Some(secs)) => rdslink::text::timeout_for_duration(secs),
        _ => 0,
    };
    let encoded = encoder.encode_with_timeout(&msg, timeout);

    println!("TEXT={}", msg.text);
    println!("RT+TAG={}", encoded.tags.payload());
    println!(
        "artist: {:>2}+{:<2} {:?}",
        msg.artist.start,
        msg.artist.len,
        msg.artist_text()
    );
    println!(
        "title:  {:>2}+{:<2} {:?}",
        msg.title.start,
        msg.title.len,
        msg.title_text()
    );
    if let Some(reason) = msg.reason {
        println!("changed: {reason}");
    }
    if !msg.censored.is_empty() {
        println!("masked: {}", msg.censored.join(", "));
    }
    for degradation in msg.degradations.iter().chain(&encoded.degradations) {
        println!("degraded: {degradation}");
    }
    Ok(())
}

async fn cmd_send(config: &Config, artist: &str, title: &str, wait: u64) -> Result<()> {
    let link = config
        .encoder
        .builder()
        .build()
        .context("starting encoder link")?;
    let event_logger = spawn_event_logger(link.subscribe());
    let pipeline = Pipeline::from_config(
        config,
        link,
        Arc::new(MemoryPreview::new()),
        Notifier::disabled(),
    )?;

    let body = serde_json::json!({ "artist": artist, "song": title }).to_string();
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(wait),
        pipeline.process(body.as_bytes()),
    )
    .await;

    pipeline.shutdown().await;
    event_logger.abort();

    match outcome {
        Ok(Outcome::Sent { text }) => {
            println!("sent in {:?}: {text}", started.elapsed());
            Ok(())
        }
        Ok(Outcome::Rejected { command, response }) => {
            bail!("encoder answered {response:?} to {command:?}")
        }
        Ok(other) => bail!("track not sent: {other:?}"),
        Err(_) => bail!(
            "no encoder connection within {wait}s at {}",
            config.encoder.builder().endpoint()
        ),
    }
}

async fn cmd_monitor(config: &Config, duration_secs: u64) -> Result<()> {
    let link = config
        .encoder
        .builder()
        .build()
        .context("starting encoder link")?;
    let mut events = link.subscribe();
    let mut states = link.watch_state();

    println!(
        "Monitoring {} (Ctrl-C to stop)...",
        config.encoder.builder().endpoint()
    );

    let deadline = async {
        if duration_secs > 0 {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);
    let stop = shutdown_signal();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("Monitor duration elapsed.");
                break;
            }
            _ = &mut stop => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[state] {}", *states.borrow_and_update());
            }
            event = events.recv() => match event {
                Ok(event) => println!("[event] {event:?}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    link.shutdown().await;
    Ok(())
}

fn cmd_check_config(config: &Config) -> Result<()> {
    let composer = config.composer().context("building composer")?;
    print!("{}", config.to_redacted_toml()?);
    println!(
        "# denylist: {} words, filter {}",
        composer.filter().len(),
        if composer.filter().is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("# configuration OK");
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match &cli.command {
        Command::Run => cmd_run(config).await,
        Command::Compose {
            artist,
            title,
            duration,
        } => cmd_compose(&config, artist, title, *duration),
        Command::Send {
            artist,
            title,
            wait,
        } => cmd_send(&config, artist, title, *wait).await,
        Command::Monitor { duration } => cmd_monitor(&config, *duration).await,
        Command::CheckConfig => cmd_check_config(&config),
    }
}
