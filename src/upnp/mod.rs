//! Minimal UPnP control point
//!
//! Covers exactly what the driver needs: SSDP search for AVTransport and
//! RenderingControl services, device description parsing, and the handful of
//! SOAP actions used to drive a MediaRenderer.

pub mod clients;
pub mod discovery;
pub mod soap;

use quick_xml::de::from_str as xml_from_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use clients::{AvTransportClient, RenderingControl, RenderingControlClient, TransportControl};
pub use discovery::{Discovered, ScanResult, ServiceScanner, SsdpScanner};

pub const AV_TRANSPORT_URN: &str = "urn:schemas-upnp-org:service:AVTransport:1";
pub const RENDERING_CONTROL_URN: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

/// UPnP service interfaces the driver attaches to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    AvTransport,
    RenderingControl,
}

impl ServiceKind {
    /// URN used for SSDP search and SOAP action namespaces
    pub fn urn(self) -> &'static str {
        match self {
            ServiceKind::AvTransport => AV_TRANSPORT_URN,
            ServiceKind::RenderingControl => RENDERING_CONTROL_URN,
        }
    }

    /// Whether a `serviceType` from a description names this service, any version
    pub fn matches(self, service_type: &str) -> bool {
        let prefix = match self {
            ServiceKind::AvTransport => "urn:schemas-upnp-org:service:AVTransport:",
            ServiceKind::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:",
        };
        service_type.trim().starts_with(prefix)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::AvTransport => write!(f, "AVTransport"),
            ServiceKind::RenderingControl => write!(f, "RenderingControl"),
        }
    }
}

/// Errors from talking to a UPnP device
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("device returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("UPnP fault {code}: {description}")]
    Fault { code: u32, description: String },

    #[error("invalid device description: {0}")]
    Description(#[from] quick_xml::DeError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// `<device>` element of a UPnP device description
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(rename = "deviceType", default)]
    pub device_type: String,
    #[serde(rename = "friendlyName", default)]
    pub friendly_name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(rename = "manufacturerURL", default)]
    pub manufacturer_url: String,
    #[serde(rename = "modelDescription", default)]
    pub model_description: String,
    #[serde(rename = "modelName", default)]
    pub model_name: String,
    #[serde(rename = "modelNumber", default)]
    pub model_number: String,
    #[serde(rename = "modelURL", default)]
    pub model_url: String,
    #[serde(rename = "serialNumber", default)]
    pub serial_number: String,
    #[serde(rename = "UDN", default)]
    pub udn: String,
    #[serde(rename = "UPC", default)]
    pub upc: String,
    #[serde(rename = "serviceList", default)]
    pub service_list: Option<ServiceList>,
    #[serde(rename = "deviceList", default)]
    pub device_list: Option<DeviceList>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceList {
    #[serde(default)]
    pub service: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub device: Vec<DeviceDescriptor>,
}

/// `<service>` entry of a device's service list
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(rename = "serviceType", default)]
    pub service_type: String,
    #[serde(rename = "serviceId", default)]
    pub service_id: String,
    #[serde(rename = "controlURL", default)]
    pub control_url: String,
}

impl DeviceDescriptor {
    pub fn services(&self) -> &[ServiceDescriptor] {
        self.service_list
            .as_ref()
            .map(|l| l.service.as_slice())
            .unwrap_or_default()
    }

    pub fn embedded_devices(&self) -> &[DeviceDescriptor] {
        self.device_list
            .as_ref()
            .map(|l| l.device.as_slice())
            .unwrap_or_default()
    }

    /// First service of the given kind in this device or any embedded device
    pub fn find_service(&self, kind: ServiceKind) -> Option<&ServiceDescriptor> {
        self.services()
            .iter()
            .find(|s| kind.matches(&s.service_type))
            .or_else(|| {
                self.embedded_devices()
                    .iter()
                    .find_map(|d| d.find_service(kind))
            })
    }
}

/// Parsed root of a device description document
#[derive(Debug, Clone, Deserialize)]
pub struct Description {
    #[serde(rename = "URLBase", default)]
    pub url_base: Option<String>,
    pub device: DeviceDescriptor,
}

pub fn parse_description(xml: &str) -> Result<Description, ControlError> {
    Ok(xml_from_str(xml)?)
}
