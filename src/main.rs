//! Moisture Monitor - Main entry point
//!
//! Polls a soil moisture probe through an SPI ADC, logs every moisture
//! gain/loss and emails an alert when the soil dries out.

use anyhow::Context;
use clap::Parser;
use moisture_monitor_lib::acquisition::AnalogMonitor;
use moisture_monitor_lib::cli::Cli;
use moisture_monitor_lib::core::{Error, Event, EventKind, ResolvedConfig, Result};
use moisture_monitor_lib::logging;
use moisture_monitor_lib::monitor::{log_gain, log_loss, EventDispatcher, PollingLoop, StopReason};
use moisture_monitor_lib::notify::Alert;
use std::process::ExitCode;
use tokio::sync::watch;

/// Exit code for configuration errors
const EXIT_CONFIG: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Resolve configuration before anything else; the logger depends on it
    let config = match cli.resolver().resolve_all() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.print_config {
        return match config.to_toml() {
            Ok(dump) => {
                print!("{}", dump);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let outcome = run(&config).await;
    if let Err(e) = &outcome {
        log::error!("{:#}", e);
        eprintln!("Fatal: {:#}", e);
    }
    ExitCode::from(exit_status(&outcome))
}

/// Process exit status for the outcome of `run`
fn exit_status(outcome: &anyhow::Result<StopReason>) -> u8 {
    match outcome {
        Ok(StopReason::Shutdown) => 0,
        Ok(StopReason::DeviceLost(_)) => 1,
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::Config(_)) => EXIT_CONFIG,
            _ => 1,
        },
    }
}

async fn run(config: &ResolvedConfig) -> anyhow::Result<StopReason> {
    let log_settings = config.logging()?;
    logging::init(&log_settings).context("Failed to initialize logging")?;

    log::info!("Starting Moisture Monitor v{}", env!("CARGO_PKG_VERSION"));
    for diagnostic in config.diagnostics() {
        log::log!(diagnostic.level, "{}", diagnostic.message);
    }

    let acquisition = config.acquisition()?;
    let monitor = AnalogMonitor::open(acquisition.port, acquisition.device)
        .context("Failed to open the ADC")?;

    // Handlers are registered before the first tick, which may block on SMTP
    let signals = Signals::install().context("Failed to install signal handlers")?;

    let dispatcher = build_dispatcher(config)?;
    let mut polling = PollingLoop::from_settings(monitor, dispatcher, &acquisition);

    // The termination signal is the only cancellation source
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        signals.recv().await;
        let _ = shutdown_tx.send(true);
    });

    Ok(polling.run(shutdown_rx).await)
}

/// Gain is logged; loss is logged and, when a transport is configured, emailed
fn build_dispatcher(config: &ResolvedConfig) -> anyhow::Result<EventDispatcher> {
    let dispatcher = EventDispatcher::new().with_handler(EventKind::Gain, log_gain);

    let alert = match config.notification()? {
        Some(settings) => {
            log::info!("Loss notifications go to {} via {}", settings.to, settings.host);
            Some(Alert::smtp(&settings).context("Failed to set up SMTP notifications")?)
        }
        None => {
            log::warn!("No SMTP host configured, loss notifications disabled");
            None
        }
    };

    Ok(dispatcher.with_handler(EventKind::Loss, move |event: &Event| -> Result<()> {
        log_loss(event)?;
        match &alert {
            Some(alert) => alert.send(event),
            None => Ok(()),
        }
    }))
}

/// SIGINT and SIGTERM listeners
#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => log::info!("Received SIGINT (Ctrl+C)"),
            _ = self.terminate.recv() => log::info!("Received SIGTERM"),
        }
    }
}

#[cfg(windows)]
struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(mut self) {
        self.ctrl_c.recv().await;
        log::info!("Received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(exit_status(&Ok(StopReason::Shutdown)), 0);

        let lost = StopReason::DeviceLost(Error::PermanentAcquisition("gone".into()));
        assert_eq!(exit_status(&Ok(lost)), 1);

        let config: anyhow::Result<StopReason> = Err(anyhow::Error::new(Error::Config(
            "transport-host is not a valid DNS name".into(),
        ))
        .context("Failed to set up SMTP notifications"));
        assert_eq!(exit_status(&config), EXIT_CONFIG);

        let io: anyhow::Result<StopReason> =
            Err(anyhow::Error::new(Error::Logging("read-only filesystem".into())));
        assert_eq!(exit_status(&io), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_during_blocking_first_tick_is_caught() {
        let signals = Signals::install().unwrap();

        // Nothing yields between install and the signal, as with a first tick
        // stuck in an SMTP send
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
    }
}
