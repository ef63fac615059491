//! headline-reader: reads a queue of headlines aloud with a floating
//! bubble and a persistent notification as controls.

mod api;
mod command;
mod config;
mod foreground;
mod gesture;
mod notifier;
mod overlay;
mod playback;
mod queue;
mod service;
mod speech;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::notifier::{DesktopStatusSurface, LogStatusSurface, StatusSurface};
use crate::overlay::{DisplayCapability, LogBubbleSurface};
use crate::service::{Collaborators, ServiceSupervisor};

#[derive(Parser, Debug)]
#[command(name = "headline-reader", about = "Headline reader with bubble and notification controls")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Never show the floating bubble (notification-only control)
    #[arg(long)]
    no_overlay: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy D-Bus/HTTP internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=warn,zbus=warn,reqwest=warn")
    } else {
        EnvFilter::new("info,hyper=warn,zbus=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("headline-reader starting");

    let config = config::Config::load(args.config.as_deref());
    info!("Config loaded: {} headline(s)", config.headlines.len());

    let speech = speech::init(&config.tts);

    let status: Box<dyn StatusSurface> = if config.notification.enabled {
        Box::new(DesktopStatusSurface::new(&config.notification.title))
    } else {
        Box::new(LogStatusSurface)
    };
    let overlay_enabled = config.overlay.enabled && !args.no_overlay;

    let collaborators = Collaborators {
        speech,
        probe: Arc::new(foreground::XdotoolProbe),
        capability: Arc::new(DisplayCapability::new(overlay_enabled)),
        bubble: Box::new(LogBubbleSurface),
        status,
    };

    let api_config = config.api.clone();
    let supervisor = ServiceSupervisor::new(config, collaborators);

    if api_config.enabled {
        if let Err(e) = api::start_api(supervisor.handle(), api_config.port).await {
            warn!("{e}");
            info!("API disabled, continuing with notification and bubble controls");
        }
    }

    supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
