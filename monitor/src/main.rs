//! Main entry point for the monitor binary
//!
//! Loads the configuration, assembles the real service implementations with
//! explicit dependency injection, and runs the supervisor until a shutdown
//! is requested via ctrl-c.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::warn;

use monitor::services::{mail::LogAlerter, BusChannel, HttpProber, MonitoredProcess};
use monitor::supervisor::message_actions;
use monitor::{Alerter, MonitorConfig, MonitorResult, Supervisor, Watchdog};
use shared::{logging, process_info, BusConfig, MessageBus, Participant};

/// Watchdog for a set of worker server processes
#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Spawns worker processes and keeps them alive")]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "monitor.json")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> MonitorResult<()> {
    let args = Args::parse();

    Participant::init_monitor();
    logging::init_tracing_with_level(Some(&args.log_level));
    logging::log_startup(&Participant::Monitor, "loading configuration");

    let config = MonitorConfig::load(&args.config)?;
    if config.mail.is_some() {
        // the command vocabulary lives behind MailGateway; no transport is
        // wired into this binary
        warn!("mail section present in config but no mail transport is available, portal disabled");
    }

    let bus = Arc::new(MessageBus::new(BusConfig {
        listen_addr: config.monitor.socket_addr()?,
        peers: config.peer_table()?,
    }));
    let control = Arc::new(BusChannel::new(Arc::clone(&bus)));
    let alerter: Arc<dyn Alerter> = Arc::new(LogAlerter);

    let mut supervisor = Supervisor::new(control.clone());
    for participant in Participant::workers() {
        let spec = config.worker(participant).ok_or_else(|| {
            monitor::MonitorError::config(format!("no worker section for {participant}"))
        })?;
        let process = Arc::new(MonitoredProcess::new(participant, spec.clone()));
        let prober = Arc::new(HttpProber::new(participant, spec.test_url.clone())?);
        let watchdog = Watchdog::spawn(
            participant,
            process.clone(),
            control.clone(),
            prober,
            alerter.clone(),
        );
        supervisor.register_worker(participant, process, watchdog);
    }

    bus.start(message_actions(supervisor.watchdog_events())).await?;
    process_info!(Participant::Monitor, "bus listening on {}", config.monitor.socket_addr()?);

    supervisor.start_all();

    let shutdown = supervisor.shutdown_sender();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(()).await;
        }
    });

    supervisor.run().await;
    logging::log_success(&Participant::Monitor, "monitor exited cleanly");
    Ok(())
}
