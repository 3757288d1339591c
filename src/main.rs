use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use siphon::checkpoint::{CheckpointStore, FileCheckpointStore, SqliteCheckpointStore};
use siphon::config::{CheckpointBackend, CheckpointConfig, Config, StanzaConfig};
use siphon::feed::{clean_entry, flatten_sorted, PlainTextConverter};
use siphon::poll::{fetch_stanza, PollOutcome, Poller};
use siphon::sink::{Event, EventSink, JsonLinesSink};

/// Get the config directory path (~/.config/siphon/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("siphon"))
}

/// Create the config directory if needed, owner-only on Unix.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "siphon",
    about = "Incremental RSS/Atom/RDF importer: emits each new feed entry once as a flat JSON event"
)]
struct Args {
    /// Config file (default: ~/.config/siphon/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every configured stanza on its interval, writing events to stdout
    Run {
        /// Poll due stanzas once and exit
        #[arg(long)]
        once: bool,

        /// Only poll the named stanza
        #[arg(long, value_name = "NAME")]
        stanza: Option<String>,
    },
    /// Fetch a feed once and print every entry, without checkpointing
    Tail {
        url: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// Proxy URL, e.g. http://proxy:8080
        #[arg(long)]
        proxy: Option<String>,

        /// Convert HTML content and summaries to plain text
        #[arg(long)]
        clean_html: bool,
    },
    /// Validate the configuration and list the stanzas
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries events, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match args.command {
        Command::Run { once, stanza } => run(config, &config_dir, once, stanza.as_deref()).await,
        Command::Tail {
            url,
            username,
            password,
            proxy,
            clean_html,
        } => {
            let mut stanza = StanzaConfig::new("tail", url, Duration::from_secs(1));
            stanza.username = username;
            stanza.password = password.map(Into::into);
            stanza.proxy = proxy;
            stanza.clean_html = clean_html;
            tail(&config, &stanza).await
        }
        Command::Check => {
            check(&config, &config_path);
            Ok(())
        }
    }
}

async fn open_store(
    checkpoint: &CheckpointConfig,
    config_dir: &Path,
) -> Result<Arc<dyn CheckpointStore>> {
    match checkpoint.backend {
        CheckpointBackend::Sqlite => {
            let path = match &checkpoint.path {
                Some(path) => path.clone(),
                None => {
                    ensure_config_dir(config_dir)?;
                    config_dir.join("checkpoints.db")
                }
            };
            let path_str = path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in checkpoint database path"))?;
            let store = SqliteCheckpointStore::open(path_str, checkpoint.timeout())
                .await
                .with_context(|| format!("Failed to open checkpoint database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        CheckpointBackend::Files => {
            let dir = match &checkpoint.path {
                Some(path) => path.clone(),
                None => {
                    ensure_config_dir(config_dir)?;
                    config_dir.join("checkpoints")
                }
            };
            let store = FileCheckpointStore::open(&dir, checkpoint.timeout()).with_context(|| {
                format!("Failed to open checkpoint directory {}", dir.display())
            })?;
            Ok(Arc::new(store))
        }
    }
}

async fn run(config: Config, config_dir: &Path, once: bool, only: Option<&str>) -> Result<()> {
    if let Some(name) = only {
        if config.stanza(name).is_none() {
            anyhow::bail!("No stanza named '{}' in config", name);
        }
    }
    let store = open_store(&config.checkpoint, config_dir).await?;
    let poller = Poller::new(config.http.clone(), store, Arc::new(PlainTextConverter));

    let stanzas: Vec<Arc<StanzaConfig>> = config
        .stanzas
        .into_iter()
        .filter(|s| only.map_or(true, |name| s.name == name))
        .map(Arc::new)
        .collect();
    if stanzas.is_empty() {
        anyhow::bail!("No [[stanza]] entries configured");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.check_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(stanzas = stanzas.len(), "Starting poll loop");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }

        // One task per stanza; waiting for all of them means a stanza never overlaps itself
        let handles: Vec<_> = stanzas
            .iter()
            .map(|stanza| tokio::spawn(poll_one(poller.clone(), Arc::clone(stanza))))
            .collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Poll task panicked");
            }
        }

        if once {
            break;
        }
    }
    Ok(())
}

async fn poll_one(poller: Poller, stanza: Arc<StanzaConfig>) {
    let mut sink = JsonLinesSink::new(std::io::stdout());
    match poller.poll(&stanza, &mut sink, Utc::now()).await {
        Ok(PollOutcome::NotDue) => {}
        Ok(PollOutcome::Completed { emitted, checkpoint }) => {
            tracing::debug!(
                stanza = %stanza.name,
                emitted = emitted,
                last_run = %checkpoint.last_run,
                "Checkpoint written"
            );
        }
        Err(e) => {
            tracing::error!(stanza = %stanza.name, error = %e, "Poll failed");
        }
    }
}

async fn tail(config: &Config, stanza: &StanzaConfig) -> Result<()> {
    let entries = fetch_stanza(&config.http, stanza)
        .await
        .with_context(|| format!("Failed to fetch {}", stanza.url))?;

    let converter = PlainTextConverter;
    let mut sink = JsonLinesSink::new(std::io::stdout());
    for mut entry in entries {
        if stanza.clean_html {
            clean_entry(&mut entry, &converter);
        }
        sink.emit(&Event::for_stanza(stanza, flatten_sorted(&entry, "")))
            .context("Failed to write entry")?;
    }
    Ok(())
}

fn check(config: &Config, config_path: &Path) {
    println!("Configuration OK: {}", config_path.display());
    println!(
        "Checkpoints: {:?}{}",
        config.checkpoint.backend,
        config
            .checkpoint
            .path
            .as_ref()
            .map(|p| format!(" at {}", p.display()))
            .unwrap_or_default()
    );
    if config.stanzas.is_empty() {
        println!("No stanzas configured.");
        return;
    }
    for stanza in &config.stanzas {
        println!(
            "  {:<24} every {:>6}s  {}{}{}",
            stanza.name,
            stanza.interval.as_secs(),
            stanza.url,
            if stanza.credentials().is_some() { "  [auth]" } else { "" },
            if stanza.proxy.is_some() { "  [proxy]" } else { "" },
        );
    }
}
