//! Home-automation platform binding
//!
//! The platform owns the player entities and their capability channels. The
//! driver registers one player per renderer, enables channels as UPnP
//! services appear, and reports state back after commands succeed.

pub mod mqtt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use mqtt::MqttPlatform;

/// Playback states a control channel can advertise and report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Requested volume change. Either part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    /// Fractional level, 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

/// Command issued by the platform against a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "camelCase")]
pub enum PlayerCommand {
    PlayPause(bool),
    Stop,
    PlaylistJump(i64),
    SetVolume(VolumeState),
}

impl PlayerCommand {
    /// Channel a command is addressed to
    pub fn channel(&self) -> Channel {
        match self {
            PlayerCommand::SetVolume(_) => Channel::Volume,
            _ => Channel::Control,
        }
    }
}

/// Capability channels a player can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Control,
    Volume,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Control => "control",
            Channel::Volume => "volume",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration record for a new player entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub natural_id: String,
    pub natural_id_type: String,
    pub name: String,
    pub display_name: String,
    pub signatures: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("platform rejected request: {0}")]
    Rejected(String),
}

/// Entry point into the platform for creating players
#[async_trait]
pub trait Platform: Send + Sync {
    async fn create_player(
        &self,
        info: &PlayerInfo,
    ) -> Result<Arc<dyn PlayerChannels>, PlatformError>;
}

/// Platform-side handle of one registered player
#[async_trait]
pub trait PlayerChannels: Send + Sync {
    async fn enable_control_channel(&self, states: &[PlaybackState])
        -> Result<(), PlatformError>;

    async fn enable_volume_channel(&self, supports_mute: bool) -> Result<(), PlatformError>;

    async fn report_control_state(&self, state: PlaybackState) -> Result<(), PlatformError>;

    async fn report_volume_state(&self, state: &VolumeState) -> Result<(), PlatformError>;
}
