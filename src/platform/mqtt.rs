//! MQTT platform binding
//!
//! Players and their channels are announced as retained messages under
//! `<prefix>/device/<id>/...`. Commands arrive on
//! `<prefix>/device/<id>/channel/<channel>/command` and are forwarded to the
//! event bus as `ControlCommand`s.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{
    Channel, Platform, PlatformError, PlaybackState, PlayerChannels, PlayerCommand, PlayerInfo,
    VolumeState,
};
use crate::bus::{BusEvent, SharedBus};
use crate::config::MqttConfig;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 100;

/// Platform implementation speaking JSON over MQTT
pub struct MqttPlatform {
    client: AsyncClient,
    prefix: String,
    subscriptions: Arc<RwLock<Vec<String>>>,
}

impl MqttPlatform {
    /// Connect to the broker and spawn the MQTT event loop and the bus
    /// forwarder. Both tasks stop when `shutdown` is cancelled.
    pub fn start(config: &MqttConfig, bus: SharedBus, shutdown: CancellationToken) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let subscriptions: Arc<RwLock<Vec<String>>> = Arc::new(RwLock::new(Vec::new()));

        tracing::info!("MQTT connecting to {}:{}...", config.host, config.port);

        let loop_client = client.clone();
        let loop_subscriptions = subscriptions.clone();
        let loop_bus = bus.clone();
        let loop_prefix = config.topic_prefix.clone();
        let loop_shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_shutdown.cancelled() => {
                        tracing::info!("MQTT event loop shutting down");
                        break;
                    }
                    result = eventloop.poll() => {
                        match result {
                            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                                handle_publish(&loop_bus, &loop_prefix, &publish.topic, &publish.payload);
                            }
                            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                                tracing::info!("MQTT connected (code: {:?})", ack.code);
                                let topics = loop_subscriptions.read().await.clone();
                                for topic in topics {
                                    if let Err(e) = loop_client.try_subscribe(&topic, QoS::AtLeastOnce) {
                                        tracing::warn!("Failed to resubscribe to {}: {}", topic, e);
                                    }
                                }
                            }
                            Ok(Event::Incoming(Incoming::Disconnect)) => {
                                tracing::warn!("MQTT disconnected");
                            }
                            Err(e) => {
                                tracing::error!("MQTT error: {}", e);
                                tokio::select! {
                                    _ = loop_shutdown.cancelled() => break,
                                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        let fwd_client = client.clone();
        let fwd_prefix = config.topic_prefix.clone();

        tokio::spawn(async move {
            let mut rx = bus.subscribe();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("MQTT bus forwarder shutting down");
                        break;
                    }
                    result = rx.recv() => {
                        match result {
                            Ok(BusEvent::CommandResult { device_id, success, error }) => {
                                let topic = format!("{}/device/{}/command_result", fwd_prefix, device_id);
                                let payload = json!({ "success": success, "error": error }).to_string();
                                if let Err(e) = fwd_client
                                    .publish(topic, QoS::AtMostOnce, false, payload)
                                    .await
                                {
                                    tracing::debug!("Failed to publish command result: {}", e);
                                }
                            }
                            Ok(_) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!("MQTT bus forwarder lagged by {} events", n);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        Self {
            client,
            prefix: config.topic_prefix.clone(),
            subscriptions,
        }
    }

    /// Disconnect from the broker
    pub async fn stop(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("MQTT disconnect failed: {}", e);
        }
        tracing::info!("MQTT platform stopped");
    }
}

#[async_trait]
impl Platform for MqttPlatform {
    async fn create_player(
        &self,
        info: &PlayerInfo,
    ) -> Result<Arc<dyn PlayerChannels>, PlatformError> {
        let base_topic = device_topic(&self.prefix, &info.natural_id);
        let payload = serde_json::to_vec(info)?;

        self.client
            .publish(format!("{}/announce", base_topic), QoS::AtLeastOnce, true, payload)
            .await?;

        tracing::debug!("Announced player {} on {}", info.natural_id, base_topic);

        Ok(Arc::new(MqttPlayer {
            client: self.client.clone(),
            base_topic,
            subscriptions: self.subscriptions.clone(),
        }))
    }
}

/// One announced player
struct MqttPlayer {
    client: AsyncClient,
    base_topic: String,
    subscriptions: Arc<RwLock<Vec<String>>>,
}

impl MqttPlayer {
    fn channel_topic(&self, channel: Channel, leaf: &str) -> String {
        format!("{}/channel/{}/{}", self.base_topic, channel, leaf)
    }

    async fn announce_channel(
        &self,
        channel: Channel,
        payload: serde_json::Value,
    ) -> Result<(), PlatformError> {
        self.client
            .publish(
                self.channel_topic(channel, "announce"),
                QoS::AtLeastOnce,
                true,
                payload.to_string(),
            )
            .await?;

        let command_topic = self.channel_topic(channel, "command");
        self.client
            .subscribe(command_topic.clone(), QoS::AtLeastOnce)
            .await?;

        let mut subs = self.subscriptions.write().await;
        if !subs.contains(&command_topic) {
            subs.push(command_topic);
        }
        Ok(())
    }
}

#[async_trait]
impl PlayerChannels for MqttPlayer {
    async fn enable_control_channel(
        &self,
        states: &[PlaybackState],
    ) -> Result<(), PlatformError> {
        self.announce_channel(
            Channel::Control,
            json!({
                "channel": Channel::Control,
                "protocol": "media-control",
                "supportedStates": states,
            }),
        )
        .await
    }

    async fn enable_volume_channel(&self, supports_mute: bool) -> Result<(), PlatformError> {
        self.announce_channel(
            Channel::Volume,
            json!({
                "channel": Channel::Volume,
                "protocol": "volume",
                "supportsMute": supports_mute,
            }),
        )
        .await
    }

    async fn report_control_state(&self, state: PlaybackState) -> Result<(), PlatformError> {
        let payload = serde_json::to_vec(&state)?;
        self.client
            .publish(
                self.channel_topic(Channel::Control, "state"),
                QoS::AtMostOnce,
                true,
                payload,
            )
            .await?;
        Ok(())
    }

    async fn report_volume_state(&self, state: &VolumeState) -> Result<(), PlatformError> {
        let payload = serde_json::to_vec(state)?;
        self.client
            .publish(
                self.channel_topic(Channel::Volume, "state"),
                QoS::AtMostOnce,
                true,
                payload,
            )
            .await?;
        Ok(())
    }
}

fn device_topic(prefix: &str, device_id: &str) -> String {
    format!("{}/device/{}", prefix, device_id)
}

/// Split `<prefix>/device/<id>/channel/<channel>/command` into its id and channel
pub fn parse_command_topic(prefix: &str, topic: &str) -> Option<(String, Channel)> {
    let rest = topic
        .strip_prefix(prefix)?
        .strip_prefix("/device/")?
        .strip_suffix("/command")?;
    let (device_id, channel) = rest.rsplit_once("/channel/")?;
    if device_id.is_empty() {
        return None;
    }
    let channel = match channel {
        "control" => Channel::Control,
        "volume" => Channel::Volume,
        _ => return None,
    };
    Some((device_id.to_string(), channel))
}

fn handle_publish(bus: &SharedBus, prefix: &str, topic: &str, payload: &[u8]) {
    let Some((device_id, channel)) = parse_command_topic(prefix, topic) else {
        tracing::debug!("Ignoring MQTT message on {}", topic);
        return;
    };

    match serde_json::from_slice::<PlayerCommand>(payload) {
        Ok(command) if command.channel() != channel => {
            tracing::warn!(
                "Ignoring {:?} sent to the {} channel of {}",
                command,
                channel,
                device_id
            );
        }
        Ok(command) => {
            tracing::debug!("{} command for {}: {:?}", channel, device_id, command);
            bus.publish(BusEvent::ControlCommand { device_id, command });
        }
        Err(e) => {
            tracing::warn!(
                "Malformed {} command for {}: {} ({})",
                channel,
                device_id,
                e,
                String::from_utf8_lossy(payload)
            );
        }
    }
}
