//! Typed clients for the AVTransport and RenderingControl services

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;

use super::soap::soap_call;
use super::{ControlError, AV_TRANSPORT_URN, RENDERING_CONTROL_URN};

/// Playback actions of an AVTransport service
#[async_trait]
pub trait TransportControl: Send + Sync + fmt::Debug {
    async fn play(&self, instance_id: u32, speed: &str) -> Result<(), ControlError>;
    async fn pause(&self, instance_id: u32) -> Result<(), ControlError>;
    async fn stop(&self, instance_id: u32) -> Result<(), ControlError>;
    async fn next(&self, instance_id: u32) -> Result<(), ControlError>;
    async fn previous(&self, instance_id: u32) -> Result<(), ControlError>;
}

/// Volume actions of a RenderingControl service
#[async_trait]
pub trait RenderingControl: Send + Sync + fmt::Debug {
    async fn set_mute(&self, instance_id: u32, channel: &str, mute: bool)
        -> Result<(), ControlError>;
    async fn set_volume(
        &self,
        instance_id: u32,
        channel: &str,
        volume: u16,
    ) -> Result<(), ControlError>;
}

/// SOAP client bound to one AVTransport control URL
#[derive(Clone)]
pub struct AvTransportClient {
    http: Client,
    control_url: String,
    service_type: String,
}

impl AvTransportClient {
    pub fn new(http: Client, control_url: impl Into<String>) -> Self {
        Self {
            http,
            control_url: control_url.into(),
            service_type: AV_TRANSPORT_URN.to_string(),
        }
    }

    /// Use the exact `serviceType` the device advertised (e.g. a `:2` version)
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    async fn call(&self, action: &str, args: &[(&str, String)]) -> Result<(), ControlError> {
        soap_call(&self.http, &self.control_url, &self.service_type, action, args).await?;
        Ok(())
    }
}

impl fmt::Debug for AvTransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvTransportClient")
            .field("control_url", &self.control_url)
            .field("service_type", &self.service_type)
            .finish()
    }
}

#[async_trait]
impl TransportControl for AvTransportClient {
    async fn play(&self, instance_id: u32, speed: &str) -> Result<(), ControlError> {
        self.call(
            "Play",
            &[
                ("InstanceID", instance_id.to_string()),
                ("Speed", speed.to_string()),
            ],
        )
        .await
    }

    async fn pause(&self, instance_id: u32) -> Result<(), ControlError> {
        self.call("Pause", &[("InstanceID", instance_id.to_string())])
            .await
    }

    async fn stop(&self, instance_id: u32) -> Result<(), ControlError> {
        self.call("Stop", &[("InstanceID", instance_id.to_string())])
            .await
    }

    async fn next(&self, instance_id: u32) -> Result<(), ControlError> {
        self.call("Next", &[("InstanceID", instance_id.to_string())])
            .await
    }

    async fn previous(&self, instance_id: u32) -> Result<(), ControlError> {
        self.call("Previous", &[("InstanceID", instance_id.to_string())])
            .await
    }
}

/// SOAP client bound to one RenderingControl control URL
#[derive(Clone)]
pub struct RenderingControlClient {
    http: Client,
    control_url: String,
    service_type: String,
}

impl RenderingControlClient {
    pub fn new(http: Client, control_url: impl Into<String>) -> Self {
        Self {
            http,
            control_url: control_url.into(),
            service_type: RENDERING_CONTROL_URN.to_string(),
        }
    }

    /// Use the exact `serviceType` the device advertised (e.g. a `:2` version)
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn control_url(&self) -> &str {
        &self.control_url
    }
}

impl fmt::Debug for RenderingControlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderingControlClient")
            .field("control_url", &self.control_url)
            .field("service_type", &self.service_type)
            .finish()
    }
}

#[async_trait]
impl RenderingControl for RenderingControlClient {
    async fn set_mute(
        &self,
        instance_id: u32,
        channel: &str,
        mute: bool,
    ) -> Result<(), ControlError> {
        soap_call(
            &self.http,
            &self.control_url,
            &self.service_type,
            "SetMute",
            &[
                ("InstanceID", instance_id.to_string()),
                ("Channel", channel.to_string()),
                ("DesiredMute", if mute { "1" } else { "0" }.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_volume(
        &self,
        instance_id: u32,
        channel: &str,
        volume: u16,
    ) -> Result<(), ControlError> {
        soap_call(
            &self.http,
            &self.control_url,
            &self.service_type,
            "SetVolume",
            &[
                ("InstanceID", instance_id.to_string()),
                ("Channel", channel.to_string()),
                ("DesiredVolume", volume.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}
