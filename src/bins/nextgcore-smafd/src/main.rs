//! NextGCore SMAF (Session Management Function with user-plane rule sync)
//!
//! The SMAF manages PDU sessions on behalf of the AMF:
//! - SM context create, update and release
//! - Data path selection over the configured user plane topology
//! - Concurrent PFCP rule synchronization with every forwarding node
//! - SM policy update notifications from the PCF

pub mod config;
pub mod context;
pub mod datapath;
pub mod error;
pub mod gsm_build;
pub mod gsm_handler;
pub mod models;
pub mod n4_build;
pub mod nf_profile;
pub mod ngap_build;
pub mod nsmf_handler;
pub mod oam;
pub mod pfcp_path;
pub mod sbi_path;
pub mod session_rule;
pub mod sm_context;
pub mod timer;
pub mod tunnel;
pub mod user_plane;

#[cfg(test)]
mod property_tests;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use config::{Config, UeRoutingConfig};
use context::{Collaborators, SmafContext};
use timer::{SmafTimerConfigs, SmafTimerId};

/// NextGCore SMAF - Session Management Function
#[derive(Parser, Debug)]
#[command(name = "nextgcore-smafd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core Session Management Function with forwarding-node sync", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/smaf.yaml")]
    config: String,

    /// UE routing file path
    #[arg(short = 'u', long)]
    uerouting: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,
}

/// Global shutdown flag
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    log::info!("NextGCore SMAF v{} starting...", env!("CARGO_PKG_VERSION"));

    setup_signal_handlers()?;

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    config.validate().context("Invalid configuration")?;

    let routing = match args.uerouting.as_deref() {
        Some(path) => UeRoutingConfig::load(path)
            .with_context(|| format!("Failed to load UE routing from {}", path))?,
        None => UeRoutingConfig::default(),
    };

    let ctx = SmafContext::new(&config, &routing, Collaborators::standalone(&config))
        .context("Failed to initialize SMAF context")?;
    log::info!("SMAF context initialized ({})", ctx.name);

    let mut events = ctx.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = events.recv().await {
            log::debug!("[{}] {} -> {}", change.sm_context_ref, change.from, change.to);
        }
    });

    let timers = SmafTimerConfigs::from_config(&config.configuration.timers);
    let retry = timers.get(SmafTimerId::NrfRegistrationRetry);
    let profile = nf_profile::build_nf_profile(&config);
    let registered =
        sbi_path::register_with_retry(ctx.discovery.as_ref(), &profile, retry.max_count, retry.duration).await;

    log::info!(
        "NextGCore SMAF ready (SBI {}, registered={})",
        nf_profile::api_prefix(&config),
        registered
    );

    run_event_loop(&ctx).await;

    log::info!("Shutting down...");

    if registered {
        if let Err(e) = ctx.discovery.deregister(&profile.nf_instance_id).await {
            log::warn!("NF de-registration failed: {}", e);
        }
    }
    if !ctx.registry.is_empty() {
        log::warn!("{} SM context(s) left at shutdown", ctx.registry.len());
    }

    log::info!("NextGCore SMAF stopped");
    Ok(())
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);
    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();
    Ok(())
}

fn setup_signal_handlers() -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        SHUTDOWN.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;
    Ok(())
}

async fn run_event_loop(ctx: &SmafContext) {
    log::debug!("Entering main event loop");
    while !SHUTDOWN.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    log::debug!(
        "Exiting main event loop ({} SM context(s), {} PFCP operation(s) in flight)",
        ctx.registry.len(),
        ctx.engine.inflight_count()
    );
}
