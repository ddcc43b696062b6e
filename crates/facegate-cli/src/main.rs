use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate", about = "FaceGate authentication CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Run one authentication attempt
    Authenticate,
    /// Watch the live face-count classification and session state
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// List available camera devices
    Devices,
}

// `#[zbus::proxy]` generates the async `FaceGateProxy` used below.
#[zbus::proxy(
    interface = "org.freedesktop.FaceGate1",
    default_service = "org.freedesktop.FaceGate1",
    default_path = "/org/freedesktop/FaceGate1"
)]
trait FaceGate {
    async fn authenticate(&self) -> zbus::Result<(bool, String, f64, String)>;
    async fn status(&self) -> zbus::Result<String>;
    async fn face_count(&self) -> zbus::Result<String>;
}

async fn proxy() -> Result<FaceGateProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    FaceGateProxy::new(&conn)
        .await
        .context("facegated is not reachable on the session bus")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let status = proxy().await?.status().await?;
            // Re-render the JSON payload for readability.
            match serde_json::from_str::<serde_json::Value>(&status) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{status}"),
            }
        }
        Commands::Authenticate => {
            let (matched, label, distance, detail) = proxy().await?.authenticate().await?;
            if matched {
                println!("Authenticated: {label} (distance {distance:.3})");
            } else {
                println!("Not authenticated: {detail}");
            }
        }
        Commands::Watch { interval_ms } => {
            let proxy = proxy().await?;
            println!("Watching (ctrl-c to stop)...");
            let mut last = String::new();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {
                        let faces = proxy.face_count().await?;
                        let status = proxy.status().await?;
                        let state = serde_json::from_str::<serde_json::Value>(&status)
                            .ok()
                            .and_then(|v| v["state"].as_str().map(str::to_string))
                            .unwrap_or_else(|| "unknown".to_string());
                        let line = format!("faces: {faces:<5} state: {state}");
                        if line != last {
                            println!("{line}");
                            last = line;
                        }
                    }
                }
            }
        }
        Commands::Devices => {
            let devices = facegate_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            } else {
                for d in devices {
                    println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
                }
            }
        }
    }

    Ok(())
}
