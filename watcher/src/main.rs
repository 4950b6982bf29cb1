//! Deployment Watcher - Entry Point
//!
//! A long-running agent on a remote edge device. Subscribes to the
//! cloud broker for deployment notifications, downloads and verifies
//! release archives, extracts them and runs the release's deploy
//! script, reporting progress and outcome back to the control plane.

use std::env;
use std::sync::Arc;

use depwatch::app::options::{AppOptions, LifecycleOptions};
use depwatch::app::run::run;
use depwatch::app::settings::Settings;
use depwatch::cloud::docker::DockerConfigSource;
use depwatch::logs::{init_logging, LogLevel, LogOptions};
use depwatch::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Print version and exit
    if env::args().any(|arg| arg == "--version") {
        println!(
            "{}",
            serde_json::to_string_pretty(&version_info()).unwrap()
        );
        return;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse::<LogLevel>().ok())
            .unwrap_or_default(),
        json_format: env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Validate environment configuration; missing values are fatal
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let options = AppOptions::from_settings(&settings);
    let source = Arc::new(DockerConfigSource::new(
        options.layout.destination_root.clone(),
    ));

    // The process is the unit of retry: an uncaught failure in the
    // main loop triggers a fixed backoff and restart, bounded below.
    let lifecycle = LifecycleOptions::default();
    let mut retry_count = 0;

    loop {
        match run(options.clone(), source.clone(), await_shutdown_signal()).await {
            Ok(()) => break,
            Err(e) => {
                retry_count += 1;
                error!("Unexpected error: {}", e);
                if retry_count >= lifecycle.max_restarts {
                    error!("Failed after {} retries, exiting.", lifecycle.max_restarts);
                    std::process::exit(1);
                }
                info!(
                    "Restarting ({}/{})...",
                    retry_count, lifecycle.max_restarts
                );
                tokio::time::sleep(lifecycle.restart_delay).await;
            }
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
