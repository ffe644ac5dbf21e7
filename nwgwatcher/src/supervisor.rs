//! Supervision of the watcher across settings changes.
//!
//! The watcher is a self-contained value: on every pushed settings
//! document the supervisor stops the current one, drops it and builds a
//! fresh one. In-memory caches go with it; the control-plane segment cache
//! makes the rebuild cheap.

use crate::error::{Result, WatcherError};
use crate::events::{WatcherEvent, WatcherEventBus};
use crate::model::WatcherSettings;
use crate::watcher::RundownWatcher;
use nwgnrcs::NrcsClient;
use nwgplayout::{DeviceSettings, PlayoutClient, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// Grace period before giving up on a fatal initialisation error.
const INIT_GRACE: Duration = Duration::from_secs(10);

pub struct GatewaySupervisor {
    nrcs: Arc<dyn NrcsClient>,
    playout: Arc<dyn PlayoutClient>,
    base: WatcherSettings,
    device_token: String,
    bus: WatcherEventBus,
}

impl GatewaySupervisor {
    pub fn new(
        nrcs: Arc<dyn NrcsClient>,
        playout: Arc<dyn PlayoutClient>,
        base: WatcherSettings,
        device_token: impl Into<String>,
    ) -> Self {
        Self {
            nrcs,
            playout,
            base,
            device_token: device_token.into(),
            bus: WatcherEventBus::new(),
        }
    }

    /// Event stream surviving watcher rebuilds.
    pub fn subscribe(&self) -> UnboundedReceiver<WatcherEvent> {
        self.bus.subscribe()
    }

    /// Runs until the settings stream closes.
    ///
    /// Fatal at startup: a missing device token or an unreachable control
    /// plane logs the problem, waits out the grace period and returns the
    /// error for the bootstrap layer to exit on.
    pub async fn run(&self) -> Result<()> {
        if self.device_token.is_empty() {
            error!("Device token missing, cannot register with the control plane");
            tokio::time::sleep(INIT_GRACE).await;
            return Err(WatcherError::Init("device token missing".to_string()));
        }

        if let Err(err) = self
            .playout
            .set_status(StatusCode::Good, vec!["gateway starting".to_string()])
            .await
        {
            error!(error = %err, "Control plane unreachable at startup");
            tokio::time::sleep(INIT_GRACE).await;
            return Err(WatcherError::Init(format!(
                "control plane unreachable: {err}"
            )));
        }

        let mut settings_rx = self.playout.subscribe_settings();
        let mut device = match self.playout.settings().await {
            Ok(device) => device,
            Err(err) => {
                warn!(error = %err, "Could not read device settings, using local configuration");
                DeviceSettings {
                    queues: self.base.queues.clone(),
                    poll_interval_ms: self.base.poll_interval.as_millis() as u64,
                    gateway_version: self.base.gateway_version.clone(),
                    debug: self.base.debug,
                }
            }
        };

        loop {
            let settings = self.base.with_device(&device);
            if settings.debug {
                info!("Debug logging requested by device settings");
            }

            let watcher =
                RundownWatcher::new(settings, self.nrcs.clone(), self.playout.clone());
            self.forward_events(watcher.subscribe());
            watcher.start();

            match settings_rx.recv().await {
                Ok(new_device) => {
                    info!("Device settings changed, rebuilding watcher");
                    watcher.stop();
                    device = new_device;
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Settings stream lagged, re-reading current document");
                    watcher.stop();
                    if let Ok(current) = self.playout.settings().await {
                        device = current;
                    }
                }
                Err(RecvError::Closed) => {
                    info!("Settings stream closed, stopping watcher");
                    watcher.stop();
                    return Ok(());
                }
            }
        }
    }

    fn forward_events(&self, mut events: UnboundedReceiver<WatcherEvent>) {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                bus.broadcast(event);
            }
        });
    }
}
