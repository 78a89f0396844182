//! Event loop driving the bridge.

use std::future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio::time::Sleep;
use tracing::{info, warn};

use crate::bridge::channels::{BridgeInputs, BridgeOutputs};
use crate::bridge::orchestrator::{Bridge, StopReason};
use crate::config::Config;

/// Build the bridge and run it until it stops.
pub async fn run_bridge(
    config: &Config,
    outputs: BridgeOutputs,
    inputs: BridgeInputs,
) -> Result<StopReason> {
    let bridge = Bridge::new(config, outputs).context("Failed to set up the command table")?;
    Ok(bridge.run(inputs).await)
}

impl Bridge {
    /// Process events one at a time until the bridge stops.
    pub async fn run(mut self, inputs: BridgeInputs) -> StopReason {
        let BridgeInputs {
            mut xmpp_rx,
            mut im_rx,
            mut shutdown_rx,
        } = inputs;

        let mut reconnect_timer: Option<Pin<Box<Sleep>>> = None;
        let mut attempt_timer: Option<Pin<Box<Sleep>>> = None;

        info!("Bridge running");

        loop {
            tokio::select! {
                event = xmpp_rx.recv() => match event {
                    Some(event) => self.handle_xmpp_event(event),
                    None => {
                        warn!("XMPP event channel closed");
                        self.channels_closed();
                    }
                },
                event = im_rx.recv() => match event {
                    Some(event) => self.handle_im_event(event),
                    None => {
                        warn!("IM event channel closed");
                        self.channels_closed();
                    }
                },
                _ = async {
                    match reconnect_timer.as_mut() {
                        Some(timer) => timer.as_mut().await,
                        None => future::pending().await,
                    }
                }, if reconnect_timer.is_some() => {
                    reconnect_timer = None;
                    self.fire_reconnect();
                }
                _ = async {
                    match attempt_timer.as_mut() {
                        Some(timer) => timer.as_mut().await,
                        None => future::pending().await,
                    }
                }, if attempt_timer.is_some() => {
                    attempt_timer = None;
                    self.attempt_timed_out();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown requested");
                        self.shutdown();
                    }
                }
            }

            if let Some(delay) = self.take_reconnect_delay() {
                reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            if let Some(timeout) = self.take_attempt_timeout() {
                attempt_timer = Some(Box::pin(tokio::time::sleep(timeout)));
            }

            if let Some(reason) = self.stopped() {
                info!(?reason, "Bridge stopped");
                return reason;
            }
        }
    }
}
