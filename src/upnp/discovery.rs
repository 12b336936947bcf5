//! SSDP-based enumeration of UPnP service clients

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use ssdp_client::{SearchTarget, URN};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::clients::{AvTransportClient, RenderingControl, RenderingControlClient, TransportControl};
use super::{parse_description, ControlError, DeviceDescriptor, ServiceKind};

const SSDP_MX: usize = 2;

/// A service client together with the root device that hosts it
#[derive(Debug, Clone)]
pub struct Discovered<C> {
    pub device: DeviceDescriptor,
    pub location: String,
    pub client: C,
}

/// Outcome of one enumeration: the clients found plus per-device failures
#[derive(Debug)]
pub struct ScanResult<C> {
    pub clients: Vec<Discovered<C>>,
    pub errors: Vec<anyhow::Error>,
}

impl<C> Default for ScanResult<C> {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Source of service clients for a discovery pass.
///
/// An `Err` means enumeration itself could not run. Failures tied to a
/// single device belong in [`ScanResult::errors`].
#[async_trait]
pub trait ServiceScanner: Send + Sync {
    async fn transport_clients(&self) -> Result<ScanResult<Arc<dyn TransportControl>>>;
    async fn rendering_clients(&self) -> Result<ScanResult<Arc<dyn RenderingControl>>>;
}

/// Service entry resolved from a device description
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub device: DeviceDescriptor,
    pub service_type: String,
    pub control_url: String,
}

/// Scanner that multicasts an M-SEARCH per service URN and fetches each
/// responder's device description
#[derive(Clone)]
pub struct SsdpScanner {
    http: Client,
    search_timeout: Duration,
}

impl SsdpScanner {
    pub fn new(search_timeout: Duration, http_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(http_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            search_timeout,
        })
    }

    /// Description URLs of every device answering a search for `kind`
    pub async fn locate(&self, kind: ServiceKind) -> Result<(Vec<String>, Vec<anyhow::Error>)> {
        let urn: URN = kind
            .urn()
            .parse()
            .map_err(|e| anyhow!("invalid search target {}: {:?}", kind.urn(), e))?;
        let search_target = SearchTarget::URN(urn);
        let responses = ssdp_client::search(&search_target, self.search_timeout, SSDP_MX, None)
            .await
            .with_context(|| format!("SSDP search for {} failed", kind))?;

        futures::pin_mut!(responses);

        let mut locations: Vec<String> = Vec::new();
        let mut errors = Vec::new();

        while let Some(response) = responses.next().await {
            match response {
                Ok(r) => {
                    let location = r.location().to_string();
                    if !locations.contains(&location) {
                        locations.push(location);
                    }
                }
                Err(e) => errors.push(anyhow!("SSDP response error: {}", e)),
            }
        }

        Ok((locations, errors))
    }

    /// Fetch a device description and locate the `kind` service in it
    pub async fn resolve(&self, location: &str, kind: ServiceKind) -> Result<ResolvedService> {
        let xml = self
            .http
            .get(location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ControlError::from)?
            .text()
            .await
            .map_err(ControlError::from)?;

        let description = parse_description(&xml)
            .with_context(|| format!("bad description at {}", location))?;

        let service = description
            .device
            .find_service(kind)
            .ok_or_else(|| anyhow!("{} advertises no {} service", location, kind))?;

        let control_url = resolve_control_url(
            description.url_base.as_deref(),
            location,
            &service.control_url,
        )?;
        let service_type = service.service_type.trim().to_string();

        Ok(ResolvedService {
            device: description.device,
            service_type,
            control_url,
        })
    }

    async fn scan<C>(
        &self,
        kind: ServiceKind,
        make_client: impl Fn(&Client, &ResolvedService) -> C + Send,
    ) -> Result<ScanResult<C>>
    where
        C: Send,
    {
        let (locations, mut errors) = self.locate(kind).await?;
        let mut clients = Vec::with_capacity(locations.len());

        for location in locations {
            match self.resolve(&location, kind).await {
                Ok(resolved) => {
                    let client = make_client(&self.http, &resolved);
                    clients.push(Discovered {
                        device: resolved.device,
                        location,
                        client,
                    });
                }
                Err(e) => errors.push(e.context(format!("resolving {}", location))),
            }
        }

        Ok(ScanResult { clients, errors })
    }
}

#[async_trait]
impl ServiceScanner for SsdpScanner {
    async fn transport_clients(&self) -> Result<ScanResult<Arc<dyn TransportControl>>> {
        self.scan(ServiceKind::AvTransport, |http, resolved| {
            Arc::new(
                AvTransportClient::new(http.clone(), resolved.control_url.clone())
                    .with_service_type(resolved.service_type.clone()),
            ) as Arc<dyn TransportControl>
        })
        .await
    }

    async fn rendering_clients(&self) -> Result<ScanResult<Arc<dyn RenderingControl>>> {
        self.scan(ServiceKind::RenderingControl, |http, resolved| {
            Arc::new(
                RenderingControlClient::new(http.clone(), resolved.control_url.clone())
                    .with_service_type(resolved.service_type.clone()),
            ) as Arc<dyn RenderingControl>
        })
        .await
    }
}

/// Resolve a service control URL against the description's `URLBase`, or
/// the description location when no base is given
pub fn resolve_control_url(
    url_base: Option<&str>,
    location: &str,
    control_url: &str,
) -> Result<String, ControlError> {
    let base = match url_base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => Url::parse(base)?,
        None => Url::parse(location)?,
    };
    Ok(base.join(control_url.trim())?.to_string())
}
