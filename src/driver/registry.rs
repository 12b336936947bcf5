//! Device registry keyed by UPnP unique device name

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::player::MediaPlayer;
use super::DriverError;
use crate::platform::Platform;
use crate::upnp::DeviceDescriptor;

/// Players created so far. Entries are never removed.
#[derive(Default)]
pub struct DeviceRegistry {
    players: RwLock<HashMap<String, Arc<MediaPlayer>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<MediaPlayer>> {
        self.players.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.players.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Existing player for the device's UDN, or a newly registered one.
    ///
    /// Returns the player and whether it was created by this call.
    pub async fn get_or_create(
        &self,
        platform: &dyn Platform,
        device: &DeviceDescriptor,
    ) -> Result<(Arc<MediaPlayer>, bool), DriverError> {
        let id = device.udn.trim();
        if id.is_empty() {
            return Err(DriverError::MissingUdn {
                name: device.friendly_name.clone(),
            });
        }

        if let Some(existing) = self.get(id).await {
            return Ok((existing, false));
        }

        let player = Arc::new(MediaPlayer::create(platform, id, device).await?);

        let mut players = self.players.write().await;
        match players.get(id) {
            // Lost a race with a concurrent creator; keep the first one
            Some(existing) => Ok((existing.clone(), false)),
            None => {
                players.insert(id.to_string(), player.clone());
                Ok((player, true))
            }
        }
    }
}
