use anyhow::Result;
use facegate_core::FaceCount;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod dbus_interface;
mod engine;
mod gate;
mod monitor;
mod session;
mod store;

use config::Config;
use dbus_interface::FaceGateService;
use engine::{EngineConfig, EngineHandle};
use gate::ModelGate;
use monitor::CaptureMonitor;
use session::Session;

const BUS_NAME: &str = "org.freedesktop.FaceGate1";
const OBJECT_PATH: &str = "/org/freedesktop/FaceGate1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();

    let entries = match dataset::load_manifest(&config.dataset_manifest) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                manifest = %config.dataset_manifest.display(),
                error = %e,
                "dataset manifest unreadable; the store will be empty"
            );
            Vec::new()
        }
    };

    let gate = ModelGate::new(
        EngineConfig {
            model_paths: config.model_paths(),
            camera_device: config.camera_device.clone(),
            warmup_frames: config.warmup_frames,
        },
        config.model_load_timeout(),
    );

    let (count_tx, count_rx) = watch::channel(FaceCount::Zero);
    let session: Arc<Session<EngineHandle>> =
        Arc::new(Session::new(config.match_threshold, count_rx));

    // A gate failure is terminal for the session, but the daemon keeps
    // serving so clients can observe the error state.
    let monitor = match session.start(gate.prepare(), entries).await {
        Ok(source) => Some(CaptureMonitor::spawn(
            source,
            config.monitor_period(),
            count_tx,
        )),
        Err(e) => {
            tracing::error!(error = %e, "session start failed; serving in error state");
            None
        }
    };

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, FaceGateService::new(Arc::clone(&session)))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    session.close();
    if let Some(monitor) = monitor {
        monitor.stop().await;
    }

    Ok(())
}
