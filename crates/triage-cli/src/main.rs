//! Command-line front end for notification triage.
//!
//! Messages are read from a JSON or YAML file holding an array of
//! messages. `classify` labels them once; `watch` keeps polling the file's
//! unlabelled messages until Ctrl-C and writes the labels back.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_core::Message;
use triage_runtime::{
    build_classification_prompt, GeminiProvider, InMemoryStore, LlmProvider, Orchestrator, Poller,
    RuntimeConfig,
};

#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(about = "Classify tax portal notifications under a strict provider quota", long_about = None)]
struct Cli {
    /// Configuration file (YAML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Never call the provider; label everything with the fallback
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify the messages of a file once
    Classify {
        /// Message file (JSON array, or YAML by extension)
        #[arg(short, long)]
        input: PathBuf,

        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include messages that are already labelled
        #[arg(long)]
        all: bool,

        /// Print limiter and breaker state to stderr afterwards
        #[arg(long)]
        status: bool,
    },

    /// Poll a message file until interrupted
    Watch {
        /// Message file, rewritten with labels on exit
        #[arg(short, long)]
        input: PathBuf,

        /// Time between polls, e.g. "5m"
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// Messages classified per poll
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the prompt sent for a subject
    Prompt {
        /// Subject line to classify
        subject: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if cli.offline {
        config.enabled = false;
    }

    match cli.command {
        Commands::Classify {
            input,
            output,
            all,
            status,
        } => {
            let messages = read_messages(&input)?;
            let batch: Vec<Message> = messages
                .into_iter()
                .filter(|m| all || m.is_unlabeled())
                .collect();
            info!(count = batch.len(), input = %input.display(), "Classifying messages");

            let orchestrator = build_orchestrator(config)?;
            let classified = orchestrator.classify_batch(batch).await;

            let json = serde_json::to_string_pretty(&classified)?;
            match output {
                Some(path) => fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", json),
            }

            if status {
                eprintln!("{}", serde_json::to_string_pretty(&orchestrator.status())?);
            }
        }

        Commands::Watch {
            input,
            interval,
            limit,
        } => {
            if let Some(interval) = interval {
                config.poller.interval = interval;
            }
            if let Some(limit) = limit {
                config.poller.max_per_tick = limit;
            }
            config.validate()?;

            let store = Arc::new(InMemoryStore::with_messages(read_messages(&input)?));
            let poller_config = config.poller.clone();
            let orchestrator = Arc::new(build_orchestrator(config)?);

            let handle = Poller::new(orchestrator, store.clone(), poller_config).spawn();
            info!("Watching {}; press Ctrl-C to stop", input.display());
            tokio::signal::ctrl_c().await?;

            info!("Shutdown signal received");
            handle.shutdown().await.context("Poller task failed")?;
            write_messages(&input, &store.snapshot())?;
            info!(count = store.len(), "Labels written back to {}", input.display());
        }

        Commands::Prompt { subject } => {
            let prompt = build_classification_prompt(&subject);
            println!("{}", serde_json::to_string_pretty(&prompt)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "triage=debug,triage_runtime=debug,triage_core=debug"
    } else {
        "triage=info,triage_runtime=info,triage_core=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_orchestrator(config: RuntimeConfig) -> Result<Orchestrator> {
    let mut builder = Orchestrator::builder();
    if config.enabled {
        let provider = GeminiProvider::from_config(&config.provider)
            .context("Failed to configure Gemini provider (use --offline to skip it)")?;
        info!(provider = provider.name(), model = %config.provider.model, "Provider ready");
        builder = builder.provider(Arc::new(provider));
    } else {
        info!("Classification disabled, every message gets the fallback label");
    }
    Ok(builder.config(config).build()?)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let messages: Vec<Message> = if is_yaml(path) {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };

    let mut ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    ids.sort_unstable();
    if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
        bail!("Duplicate message id {} in {}", pair[0], path.display());
    }
    Ok(messages)
}

fn write_messages(path: &Path, messages: &[Message]) -> Result<()> {
    let contents = if is_yaml(path) {
        serde_yaml::to_string(messages)?
    } else {
        serde_json::to_string_pretty(messages)?
    };
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
