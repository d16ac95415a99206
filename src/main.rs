//! Application entry point: headless live voice session.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the [`LiveController`] with the websocket connector and the cpal
//!    backend, then connect.
//! 5. Spawn a status reporter that logs the observable state every 500 ms.
//! 6. Pump session events until the session ends or Ctrl-C.
//! 7. Disconnect.
//!
//! The controller holds cpal streams, which are not `Send`, so it is driven
//! on the `block_on` thread rather than spawned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use live_voice::{
    audio::CpalBackend,
    config::AppConfig,
    live::WebSocketConnector,
    pipeline::{LiveController, StatusHandle},
};

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("live-voice starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (websocket reader + writer each take one)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 4. Controller
    let backend = CpalBackend::new(config.audio.clone());
    let mut controller = LiveController::new(
        config,
        Arc::new(WebSocketConnector::new()),
        Arc::new(backend),
    );
    controller
        .connect()
        .await
        .context("failed to start live session")?;
    log::info!("Connected. Speak into the microphone; press Ctrl-C to stop.");

    // 5. Status reporter
    let reporter = tokio::spawn(report_status(controller.status_handle()));

    // 6. Event loop
    tokio::select! {
        _ = controller.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::warn!("Ctrl-C handler failed: {e}");
            }
            log::info!("Shutting down");
        }
    }

    // 7. Teardown
    controller.disconnect();
    reporter.abort();

    match controller.error() {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}

/// Log the observable state, printing the transcript only as it grows.
async fn report_status(status: StatusHandle) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    let mut last_transcript = String::new();

    loop {
        ticker.tick().await;
        let snap = status.snapshot();

        log::debug!(
            "status: {} speaking={} volume={:.3}",
            snap.connection.label(),
            snap.is_speaking,
            snap.volume
        );

        if snap.transcript != last_transcript {
            if !snap.transcript.is_empty() {
                log::info!("transcript: {}", snap.transcript);
            }
            last_transcript = snap.transcript;
        }
    }
}
