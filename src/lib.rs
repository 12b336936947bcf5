//! UPnP Media Driver
//!
//! Discovers UPnP/DLNA media renderers on the local network and exposes each
//! one to a home-automation platform as a media player.
//!
//! This library provides:
//! - SSDP discovery of AVTransport and RenderingControl services
//! - SOAP control clients for both services
//! - A device registry keyed by UDN, one player per physical renderer
//! - An MQTT platform binding for player registration and commands

pub mod bus;
pub mod config;
pub mod driver;
pub mod platform;
pub mod upnp;
