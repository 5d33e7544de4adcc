//! # Arbinquer CLI
//!
//! Keeps one live status message per game-event feed in Discord.
//!
//! Usage:
//!   arbinquer run                      # Schedule every enabled feed
//!   arbinquer run --dry-run            # Log messages instead of posting
//!   arbinquer run --feed cycles        # Only the given feed(s)
//!   arbinquer check arbitration        # Fetch + render once, print
//!   arbinquer config show              # Show effective configuration

use anyhow::{Context, Result};
use arbinquer_channels::{DiscordChannel, DiscordConfig, MemoryTransport, MessageReconciler};
use arbinquer_core::types::FeedId;
use arbinquer_core::{ArbinquerConfig, ChatTransport, Renderer};
use arbinquer_feeds::{FeedRenderer, FeedSet};
use arbinquer_scheduler::{Cadence, CadencePolicy, JobRunner, SchedulerEngine};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "arbinquer",
    version,
    about = "Arbinquer: live Discord status messages for game-event feeds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler
    Run {
        /// Render into an in-memory channel and log instead of posting
        #[arg(long)]
        dry_run: bool,

        /// Restrict to these feeds (repeatable)
        #[arg(short, long = "feed")]
        feeds: Vec<String>,
    },

    /// Fetch and render one feed, print the message
    Check {
        /// arbitration, incursions, invasions or cycles
        feed: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = ArbinquerConfig::from_env()?;

    match cli.command {
        Commands::Run { dry_run, feeds } => run(config, dry_run, &feeds).await,
        Commands::Check { feed } => check(config, &feed).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", config.to_toml()?);
                Ok(())
            }
        },
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "arbinquer=debug,arbinquer_core=debug,arbinquer_channels=debug,arbinquer_scheduler=debug,arbinquer_feeds=debug"
    } else {
        "arbinquer=info,arbinquer_channels=info,arbinquer_scheduler=info,arbinquer_feeds=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn cadence_for(feed: FeedId, config: &ArbinquerConfig) -> Cadence {
    match feed {
        FeedId::Arbitration | FeedId::Incursions => Cadence::FixedClockSlot {
            minute: config.schedule.poll_hour_minute,
        },
        FeedId::Invasions => Cadence::FixedInterval {
            every: Duration::from_secs(config.schedule.invasions_interval_secs),
        },
        FeedId::Cycles => Cadence::DynamicNextBoundary,
    }
}

async fn run(mut config: ArbinquerConfig, dry_run: bool, only: &[String]) -> Result<()> {
    if !only.is_empty() {
        config.enabled_feeds = only
            .iter()
            .map(|f| f.parse::<FeedId>())
            .collect::<std::result::Result<_, _>>()?;
    }

    let transport: Arc<dyn ChatTransport> = if dry_run {
        for feed in config.enabled_feeds.clone() {
            if config.channel_for(feed).is_none() {
                set_channel(&mut config, feed, format!("dry-run-{feed}"));
            }
        }
        config.validate_offline()?;
        Arc::new(MemoryTransport::new().logging())
    } else {
        config.validate()?;
        let discord = DiscordConfig::new(config.discord.token.clone()).with_api_base(config.discord.api_base.clone());
        Arc::new(DiscordChannel::new(discord)?)
    };

    let reconciler = MessageReconciler::new(transport.clone())
        .with_history_limit(config.reconcile.history_limit)
        .with_delete_pause(Duration::from_millis(config.reconcile.delete_pause_ms));
    let renderer = FeedRenderer::new(Duration::from_secs(config.schedule.invasions_interval_secs));
    let runner = JobRunner::new(
        CadencePolicy::from_config(&config.schedule),
        Arc::new(renderer),
        Arc::new(reconciler),
    );
    let mut engine = SchedulerEngine::new(runner).run_on_startup(config.schedule.run_on_startup);

    let feeds = FeedSet::new(&config.sources)?;
    for &feed in &config.enabled_feeds {
        let channel = config
            .channel_for(feed)
            .with_context(|| format!("no channel configured for {feed}"))?;
        engine.add_job(feeds.source(feed), cadence_for(feed, &config), channel);
    }

    tracing::info!(
        jobs = engine.job_count(),
        transport = transport.name(),
        "arbinquer v{} started",
        env!("CARGO_PKG_VERSION")
    );
    let handle = engine.start();

    shutdown_signal().await;
    tracing::info!("shutdown requested, cancelling pending jobs");

    for job in handle.shutdown().await {
        tracing::info!(
            feed = %job.feed_id,
            runs = job.runs,
            failures = job.consecutive_failures,
            message_id = job.last_message_ref.as_deref().unwrap_or("-"),
            "job stopped"
        );
    }
    Ok(())
}

fn set_channel(config: &mut ArbinquerConfig, feed: FeedId, channel: String) {
    let slot = match feed {
        FeedId::Arbitration => &mut config.channels.arbitration,
        FeedId::Incursions => &mut config.channels.incursions,
        FeedId::Invasions => &mut config.channels.invasions,
        FeedId::Cycles => &mut config.channels.cycles,
    };
    *slot = Some(channel);
}

async fn check(config: ArbinquerConfig, feed: &str) -> Result<()> {
    let feed: FeedId = feed.parse()?;
    let feeds = FeedSet::new(&config.sources)?;
    let snapshot = feeds
        .source(feed)
        .fetch()
        .await
        .with_context(|| format!("fetching {feed}"))?;
    let renderer = FeedRenderer::new(Duration::from_secs(config.schedule.invasions_interval_secs));
    println!("{}", renderer.render(&snapshot)?);
    if let Some(boundary) = snapshot.next_boundary_at {
        println!("\nnext boundary: {boundary}");
    }
    println!("fingerprint: {}", snapshot.fingerprint());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!("cannot listen for SIGTERM: {e}"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
