//! Driver - discovery loop and command dispatch
//!
//! Every `interval` the driver enumerates AVTransport and RenderingControl
//! clients, gets or creates the player for each client's device and attaches
//! the client to it. In parallel it applies `ControlCommand`s from the bus to
//! the matching player. Each player has its own command worker, so commands
//! to one device run in arrival order while devices proceed independently.

pub mod player;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::platform::{Channel, Platform, PlatformError, PlayerCommand};
use crate::upnp::{ControlError, DeviceDescriptor, ServiceKind, ServiceScanner};

pub use player::MediaPlayer;
pub use registry::DeviceRegistry;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Commands buffered per device before new ones are refused
const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to find {service} clients: {source:#}")]
    Enumeration {
        service: ServiceKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to register player {id}: {source}")]
    Registration {
        id: String,
        #[source]
        source: PlatformError,
    },

    #[error("device {name:?} has no UDN")]
    MissingUdn { name: String },

    #[error("failed to enable {channel} channel for {id}: {source}")]
    ChannelRegistration {
        id: String,
        channel: Channel,
        #[source]
        source: PlatformError,
    },

    #[error("no {0} client attached")]
    NotAttached(ServiceKind),

    #[error(transparent)]
    Control(#[from] ControlError),
}

impl DriverError {
    /// Errors after which the driver cannot keep running
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Enumeration { .. } | DriverError::ChannelRegistration { .. }
        )
    }
}

/// Counts from one discovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub transports: usize,
    pub renderers: usize,
    pub devices: usize,
}

pub struct Driver {
    registry: Arc<DeviceRegistry>,
    platform: Arc<dyn Platform>,
    scanner: Arc<dyn ServiceScanner>,
    bus: SharedBus,
    interval: Duration,
    shutdown: CancellationToken,
    /// Command queue of each player's worker, keyed by device id
    workers: Mutex<HashMap<String, mpsc::Sender<PlayerCommand>>>,
}

impl Driver {
    pub fn new(
        platform: Arc<dyn Platform>,
        scanner: Arc<dyn ServiceScanner>,
        bus: SharedBus,
        interval: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            platform,
            scanner,
            bus,
            interval,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Stop the discovery and command loops
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run discovery and command dispatch until shutdown or a fatal error
    pub async fn run(&self) -> Result<(), DriverError> {
        info!("Driver starting (discovery every {:?})", self.interval);

        let commands = self.bus.subscribe();

        let result = tokio::select! {
            result = self.discovery_loop() => result,
            _ = self.command_loop(commands) => Ok(()),
        };

        if let Err(e) = &result {
            error!("Driver stopped: {}", e);
        } else {
            info!("Driver stopped");
        }
        result
    }

    async fn discovery_loop(&self) -> Result<(), DriverError> {
        loop {
            match self.search().await {
                Ok(summary) => {
                    debug!(
                        "Discovery pass complete: {} transport, {} rendering clients, {} devices",
                        summary.transports, summary.renderers, summary.devices
                    );
                    self.bus.publish(BusEvent::DiscoveryCompleted {
                        transports: summary.transports,
                        renderers: summary.renderers,
                        devices: summary.devices,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Discovery pass failed: {}", e),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Discovery loop shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One discovery pass over both service types
    pub async fn search(&self) -> Result<PassSummary, DriverError> {
        let mut summary = PassSummary::default();

        let scan = self
            .scanner
            .transport_clients()
            .await
            .map_err(|source| DriverError::Enumeration {
                service: ServiceKind::AvTransport,
                source,
            })?;

        for e in &scan.errors {
            warn!("Error finding transport clients: {:#}", e);
        }

        for found in scan.clients {
            debug!("Found transport client {:?} at {}", found.client, found.location);
            let Some(player) = self.resolve(&found.device, ServiceKind::AvTransport).await else {
                continue;
            };
            let first = player.set_transport_client(found.client).await?;
            self.attached(&player, ServiceKind::AvTransport, first.then_some(Channel::Control));
            summary.transports += 1;
        }

        let scan = self
            .scanner
            .rendering_clients()
            .await
            .map_err(|source| DriverError::Enumeration {
                service: ServiceKind::RenderingControl,
                source,
            })?;

        for e in &scan.errors {
            warn!("Error finding rendering clients: {:#}", e);
        }

        for found in scan.clients {
            debug!("Found rendering client {:?} at {}", found.client, found.location);
            let Some(player) = self.resolve(&found.device, ServiceKind::RenderingControl).await
            else {
                continue;
            };
            let first = player.set_rendering_client(found.client).await?;
            self.attached(&player, ServiceKind::RenderingControl, first.then_some(Channel::Volume));
            summary.renderers += 1;
        }

        summary.devices = self.registry.len().await;
        Ok(summary)
    }

    /// Get or create the player for a device; `None` skips it for this pass
    async fn resolve(
        &self,
        device: &DeviceDescriptor,
        service: ServiceKind,
    ) -> Option<Arc<MediaPlayer>> {
        match self
            .registry
            .get_or_create(self.platform.as_ref(), device)
            .await
        {
            Ok((player, created)) => {
                if created {
                    info!("New media player {} ({})", player.id(), player.display_name());
                    self.bus.publish(BusEvent::PlayerRegistered {
                        device_id: player.id().to_string(),
                        display_name: player.display_name().to_string(),
                    });
                }
                Some(player)
            }
            Err(e) => {
                warn!(
                    "Found a {} client, but couldn't create the device: {}",
                    service, e
                );
                None
            }
        }
    }

    fn attached(&self, player: &MediaPlayer, service: ServiceKind, enabled: Option<Channel>) {
        debug!("{}: {} client attached", player.id(), service);
        self.bus.publish(BusEvent::ClientAttached {
            device_id: player.id().to_string(),
            service,
        });
        if let Some(channel) = enabled {
            self.bus.publish(BusEvent::ChannelEnabled {
                device_id: player.id().to_string(),
                channel,
            });
        }
    }

    async fn command_loop(&self, mut rx: broadcast::Receiver<BusEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Command loop shutting down");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(BusEvent::ControlCommand { device_id, command }) => {
                            self.dispatch(device_id, command).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Command loop lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Queue a command on the player's worker
    async fn dispatch(&self, device_id: String, command: PlayerCommand) {
        let Some(player) = self.registry.get(&device_id).await else {
            warn!("Command for unknown device {}", device_id);
            self.publish_failure(device_id, "unknown device");
            return;
        };

        let tx = {
            let mut workers = self.workers.lock().await;
            let running = workers
                .get(&device_id)
                .filter(|tx| !tx.is_closed())
                .cloned();
            match running {
                Some(tx) => tx,
                None => {
                    let tx = self.spawn_worker(device_id.clone(), player);
                    workers.insert(device_id.clone(), tx.clone());
                    tx
                }
            }
        };

        if let Err(e) = tx.try_send(command) {
            warn!("{}: dropping command: {}", device_id, e);
            self.publish_failure(device_id, "command queue unavailable for");
        }
    }

    /// Start the task that applies one player's commands in order
    fn spawn_worker(
        &self,
        device_id: String,
        player: Arc<MediaPlayer>,
    ) -> mpsc::Sender<PlayerCommand> {
        let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let bus = self.bus.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            debug!("{}: command worker started", device_id);
            loop {
                let command = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };

                let result = player.apply(command).await;
                if let Err(e) = &result {
                    warn!("{}: command failed: {}", device_id, e);
                }
                bus.publish(BusEvent::CommandResult {
                    device_id: device_id.clone(),
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                });
            }
            debug!("{}: command worker stopped", device_id);
        });

        tx
    }

    fn publish_failure(&self, device_id: String, reason: &str) {
        self.bus.publish(BusEvent::CommandResult {
            error: Some(format!("{} {}", reason, device_id)),
            device_id,
            success: false,
        });
    }
}
