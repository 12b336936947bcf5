//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR_NAME: &str = "upnp-media-driver";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,
}

#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    /// Pause between the end of one discovery pass and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How long each SSDP search listens for responses
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    /// HTTP timeout for description fetches and SOAP actions
    #[serde(default = "default_soap_timeout_secs")]
    pub soap_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            soap_timeout_secs: default_soap_timeout_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn soap_timeout(&self) -> Duration {
        Duration::from_secs(self.soap_timeout_secs)
    }
}

fn default_interval_secs() -> u64 {
    crate::driver::DEFAULT_INTERVAL.as_secs()
}

fn default_search_timeout_secs() -> u64 {
    3
}

fn default_soap_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            topic_prefix: default_topic_prefix(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    APP_DIR_NAME.to_string()
}

fn default_topic_prefix() -> String {
    APP_DIR_NAME.to_string()
}

/// Get config directory (UMD_CONFIG_DIR, XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("UMD_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let config = ::config::Config::builder()
        .set_default("discovery.interval_secs", default_interval_secs() as i64)?
        .set_default("mqtt.port", default_mqtt_port() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (UMD_MQTT__HOST, UMD_DISCOVERY__INTERVAL_SECS, etc.)
        .add_source(
            ::config::Environment::with_prefix("UMD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
