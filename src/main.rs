//! Magpie - XMPP bridge for a session-based IM network
//!
//! Relays the friends, groups and discussions of an automated IM identity
//! to a single XMPP control account, and carries the operator's commands
//! back to the IM network.

mod bridge;
mod common;
mod config;
mod console;

use anyhow::Result;
use tokio::signal;
use tracing::{debug, error, info, warn};

use bridge::{run_bridge, ChannelBundle, StopReason};
use config::{env::get_config_path, load_and_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Magpie v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  XMPP Account: {}", config.xmpp.account);
    info!("  Control Account: {}", config.xmpp.control_account);
    info!("  IM Account: {}", config.im.account);
    info!("  Staging Directory: {}", config.bridge.staging_dir.display());

    // ============================================================
    // Create channels and start the collaborators
    // ============================================================
    let channels = ChannelBundle::new();
    let shutdown_tx = channels.control.shutdown_tx;

    let xmpp_task = tokio::spawn(console::run_xmpp_console(
        config.xmpp.control_account.clone(),
        channels.xmpp,
    ));
    let im_task = tokio::spawn(console::run_offline_im(channels.im));

    // ============================================================
    // Run the bridge
    // ============================================================
    let bridge_config = config.clone();
    let outputs = channels.outputs;
    let inputs = channels.inputs;
    let mut bridge_task =
        tokio::spawn(async move { run_bridge(&bridge_config, outputs, inputs).await });

    let finished = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping bridge...");
            if let Err(e) = shutdown_tx.send(true) {
                debug!("Shutdown channel closed (bridge already exited): {}", e);
            }
            let timeout = tokio::time::Duration::from_secs(5);
            match tokio::time::timeout(timeout, &mut bridge_task).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Bridge did not stop in time");
                    bridge_task.abort();
                    Ok(Ok(StopReason::Shutdown))
                }
            }
        }
        result = &mut bridge_task => result,
    };

    xmpp_task.abort();
    im_task.abort();

    let reason = finished??;
    info!(?reason, "Exiting...");
    match reason {
        StopReason::Terminal(code) => {
            anyhow::bail!("IM network ended the session with code {}", code)
        }
        StopReason::ReconnectExhausted => anyhow::bail!("Could not reconnect to the IM network"),
        _ => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
