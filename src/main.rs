//! UPnP Media Driver
//!
//! Discovers UPnP media renderers and bridges them to the home-automation
//! platform over MQTT.

use upnp_media_driver::{bus, config, driver, platform, upnp};

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upnp_media_driver=debug,rumqttc=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting UPnP Media Driver v{} ({})",
        env!("UMD_VERSION"),
        env!("UMD_GIT_SHA")
    );

    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded, broker: {}:{}, discovery every {}s",
        config.mqtt.host,
        config.mqtt.port,
        config.discovery.interval_secs
    );

    let bus = bus::create_bus();
    let platform_shutdown = tokio_util::sync::CancellationToken::new();

    let mqtt = Arc::new(platform::MqttPlatform::start(
        &config.mqtt,
        bus.clone(),
        platform_shutdown.clone(),
    ));

    let scanner = Arc::new(upnp::SsdpScanner::new(
        config.discovery.search_timeout(),
        config.discovery.soap_timeout(),
    )?);

    let driver = driver::Driver::new(
        mqtt.clone(),
        scanner,
        bus.clone(),
        config.discovery.interval(),
    );

    let result = tokio::select! {
        result = driver.run() => result,
        _ = shutdown_signal() => {
            driver.shutdown();
            Ok(())
        }
    };

    tracing::info!("Shutting down...");
    bus.publish(bus::BusEvent::ShuttingDown {
        reason: result.as_ref().err().map(|e| e.to_string()),
    });
    mqtt.stop().await;
    platform_shutdown.cancel();

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Fatal driver error: {}", e);
            Err(e.into())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
