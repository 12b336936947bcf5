//! Media player adapter - one per physical renderer
//!
//! Forwards platform commands to whichever AVTransport / RenderingControl
//! client is currently attached, and enables the matching platform channel
//! the first time each kind of client shows up.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::DriverError;
use crate::platform::{
    Channel, Platform, PlaybackState, PlayerChannels, PlayerCommand, PlayerInfo, VolumeState,
};
use crate::upnp::{DeviceDescriptor, RenderingControl, ServiceKind, TransportControl};

const INSTANCE_ID: u32 = 0;
const MASTER_CHANNEL: &str = "Master";
const PLAY_SPEED: &str = "1";
const NATURAL_ID_TYPE: &str = "upnp";
const THING_TYPE_KEY: &str = "ninja:thingType";
const THING_TYPE: &str = "mediaplayer";

/// Playback states advertised on the control channel
pub const CONTROL_STATES: [PlaybackState; 3] = [
    PlaybackState::Playing,
    PlaybackState::Paused,
    PlaybackState::Stopped,
];

/// Attachment state of one service client
#[derive(Debug, Clone, Default)]
pub enum ClientSlot<C> {
    #[default]
    Unattached,
    Attached(C),
}

impl<C: Clone> ClientSlot<C> {
    /// Store `client`, returning `true` if this is the first attachment
    pub fn attach(&mut self, client: C) -> bool {
        let first = matches!(self, ClientSlot::Unattached);
        *self = ClientSlot::Attached(client);
        first
    }

    pub fn current(&self) -> Option<C> {
        match self {
            ClientSlot::Unattached => None,
            ClientSlot::Attached(c) => Some(c.clone()),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, ClientSlot::Attached(_))
    }
}

/// Descriptive attributes sent to the platform on registration.
/// Values are passed through as advertised; empty fields are left out.
pub fn build_signatures(device: &DeviceDescriptor) -> BTreeMap<String, String> {
    let fields: [(&str, &str); 12] = [
        ("upnp:deviceType", device.device_type.as_str()),
        ("upnp:friendlyName", device.friendly_name.as_str()),
        ("upnp:manufacturer", device.manufacturer.as_str()),
        ("upnp:manufacturerURL", device.manufacturer_url.as_str()),
        ("upnp:modelDescription", device.model_description.as_str()),
        ("upnp:modelName", device.model_name.as_str()),
        ("upnp:modelNumber", device.model_number.as_str()),
        ("upnp:modelURL", device.model_url.as_str()),
        ("upnp:serialNumber", device.serial_number.as_str()),
        ("upnp:UDN", device.udn.as_str()),
        ("upnp:UPC", device.upc.as_str()),
        (THING_TYPE_KEY, THING_TYPE),
    ];

    fields
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Human-readable name: friendly name, else "manufacturer model", else the id
pub fn display_name(id: &str, device: &DeviceDescriptor) -> String {
    let friendly = device.friendly_name.trim();
    if !friendly.is_empty() {
        return friendly.to_string();
    }
    let manufacturer = device.manufacturer.trim();
    let model = device.model_name.trim();
    if !manufacturer.is_empty() && !model.is_empty() {
        return format!("{} {}", manufacturer, model);
    }
    id.to_string()
}

pub fn player_info(id: &str, device: &DeviceDescriptor) -> PlayerInfo {
    PlayerInfo {
        natural_id: id.to_string(),
        natural_id_type: NATURAL_ID_TYPE.to_string(),
        name: id.to_string(),
        display_name: display_name(id, device),
        signatures: build_signatures(device),
    }
}

/// Adapter between one platform player and one UPnP renderer
pub struct MediaPlayer {
    id: String,
    display_name: String,
    player: Arc<dyn PlayerChannels>,
    transport: RwLock<ClientSlot<Arc<dyn TransportControl>>>,
    rendering: RwLock<ClientSlot<Arc<dyn RenderingControl>>>,
}

impl MediaPlayer {
    /// Register a new player with the platform for the given device
    pub async fn create(
        platform: &dyn Platform,
        id: &str,
        device: &DeviceDescriptor,
    ) -> Result<Self, DriverError> {
        let info = player_info(id, device);

        let player = platform
            .create_player(&info)
            .await
            .map_err(|source| DriverError::Registration {
                id: id.to_string(),
                source,
            })?;

        Ok(Self {
            id: id.to_string(),
            display_name: info.display_name,
            player,
            transport: RwLock::new(ClientSlot::Unattached),
            rendering: RwLock::new(ClientSlot::Unattached),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub async fn has_transport(&self) -> bool {
        self.transport.read().await.is_attached()
    }

    pub async fn has_rendering(&self) -> bool {
        self.rendering.read().await.is_attached()
    }

    /// Attach (or hot-swap) the AVTransport client.
    ///
    /// Returns `true` when this was the first transport client, in which case
    /// the control channel has just been enabled. A failure to enable it is
    /// fatal.
    pub async fn set_transport_client(
        &self,
        client: Arc<dyn TransportControl>,
    ) -> Result<bool, DriverError> {
        let first = self.transport.write().await.attach(client);

        if first {
            self.player
                .enable_control_channel(&CONTROL_STATES)
                .await
                .map_err(|source| DriverError::ChannelRegistration {
                    id: self.id.clone(),
                    channel: Channel::Control,
                    source,
                })?;
            tracing::info!("{}: control channel enabled", self.id);
        }

        Ok(first)
    }

    /// Attach (or hot-swap) the RenderingControl client. See
    /// [`set_transport_client`](Self::set_transport_client).
    pub async fn set_rendering_client(
        &self,
        client: Arc<dyn RenderingControl>,
    ) -> Result<bool, DriverError> {
        let first = self.rendering.write().await.attach(client);

        if first {
            self.player
                .enable_volume_channel(true)
                .await
                .map_err(|source| DriverError::ChannelRegistration {
                    id: self.id.clone(),
                    channel: Channel::Volume,
                    source,
                })?;
            tracing::info!("{}: volume channel enabled", self.id);
        }

        Ok(first)
    }

    async fn transport_client(&self) -> Result<Arc<dyn TransportControl>, DriverError> {
        self.transport
            .read()
            .await
            .current()
            .ok_or(DriverError::NotAttached(ServiceKind::AvTransport))
    }

    async fn rendering_client(&self) -> Result<Arc<dyn RenderingControl>, DriverError> {
        self.rendering
            .read()
            .await
            .current()
            .ok_or(DriverError::NotAttached(ServiceKind::RenderingControl))
    }

    /// Dispatch a platform command
    pub async fn apply(&self, command: PlayerCommand) -> Result<(), DriverError> {
        match command {
            PlayerCommand::PlayPause(play) => self.apply_play_pause(play).await,
            PlayerCommand::Stop => self.apply_stop().await,
            PlayerCommand::PlaylistJump(delta) => self.apply_playlist_jump(delta).await,
            PlayerCommand::SetVolume(state) => self.apply_volume(&state).await,
        }
    }

    /// One step forward for a positive delta, one step back otherwise.
    /// A zero delta goes back.
    pub async fn apply_playlist_jump(&self, delta: i64) -> Result<(), DriverError> {
        let client = self.transport_client().await?;
        if delta > 0 {
            client.next(INSTANCE_ID).await?;
        } else {
            client.previous(INSTANCE_ID).await?;
        }
        Ok(())
    }

    pub async fn apply_play_pause(&self, play: bool) -> Result<(), DriverError> {
        let client = self.transport_client().await?;
        if play {
            client.play(INSTANCE_ID, PLAY_SPEED).await?;
            self.report_control(PlaybackState::Playing).await;
        } else {
            client.pause(INSTANCE_ID).await?;
            self.report_control(PlaybackState::Paused).await;
        }
        Ok(())
    }

    pub async fn apply_stop(&self) -> Result<(), DriverError> {
        let client = self.transport_client().await?;
        client.stop(INSTANCE_ID).await?;
        self.report_control(PlaybackState::Stopped).await;
        Ok(())
    }

    /// Apply mute and level independently. When both fail only the mute
    /// error is returned.
    pub async fn apply_volume(&self, state: &VolumeState) -> Result<(), DriverError> {
        tracing::info!("{}: apply volume {:?}", self.id, state);

        if state.muted.is_none() && state.level.is_none() {
            return Ok(());
        }

        let client = self.rendering_client().await?;
        let mut result = Ok(());

        if let Some(muted) = state.muted {
            if let Err(e) = client.set_mute(INSTANCE_ID, MASTER_CHANNEL, muted).await {
                result = Err(DriverError::from(e));
            }
        }

        if let Some(level) = state.level {
            let percent = (level * 100.0) as u16;
            if let Err(e) = client.set_volume(INSTANCE_ID, MASTER_CHANNEL, percent).await {
                if result.is_ok() {
                    result = Err(DriverError::from(e));
                } else {
                    tracing::warn!("{}: set volume also failed: {}", self.id, e);
                }
            }
        }

        if result.is_ok() {
            if let Err(e) = self.player.report_volume_state(state).await {
                tracing::warn!("{}: failed to report volume state: {}", self.id, e);
            }
        }

        result
    }

    async fn report_control(&self, state: PlaybackState) {
        if let Err(e) = self.player.report_control_state(state).await {
            tracing::warn!("{}: failed to report {} state: {}", self.id, state, e);
        }
    }
}

impl std::fmt::Debug for MediaPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPlayer")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}
