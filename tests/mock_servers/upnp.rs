//! Mock UPnP MediaRenderer for testing
//!
//! Provides HTTP endpoints for device description and SOAP control.
//! Note: Does not implement SSDP discovery - tests point the scanner at
//! `description_url()` directly.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use upnp_media_driver::upnp::soap::extract_xml_value;

/// One SOAP action received by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAction {
    /// Full SOAPAction header value without quotes, e.g. `urn:...:AVTransport:1#Play`
    pub soap_action: String,
    pub action: String,
    pub body: String,
}

impl RecordedAction {
    pub fn arg(&self, name: &str) -> Option<String> {
        extract_xml_value(&self.body, name)
    }
}

/// Mock UPnP renderer state
#[derive(Debug, Clone)]
pub struct MockUpnpState {
    pub uuid: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    /// Service version advertised in the description (1 or 2)
    pub service_version: u8,
    /// Put the services on an embedded device instead of the root
    pub embedded_services: bool,
    pub state: String, // PLAYING, PAUSED_PLAYBACK, STOPPED
    pub volume: u32,   // 0-100
    pub muted: bool,
    /// Action name that answers with a UPnP fault
    pub fail_action: Option<String>,
    pub actions: Vec<RecordedAction>,
}

impl Default for MockUpnpState {
    fn default() -> Self {
        Self {
            uuid: "mock-upnp-uuid-12345".to_string(),
            name: "Mock UPnP Renderer".to_string(),
            manufacturer: "Mock Corp".to_string(),
            model: "Mock Model".to_string(),
            service_version: 1,
            embedded_services: false,
            state: "STOPPED".to_string(),
            volume: 50,
            muted: false,
            fail_action: None,
            actions: Vec::new(),
        }
    }
}

type SharedState = Arc<RwLock<MockUpnpState>>;

/// Mock UPnP MediaRenderer
pub struct MockUpnpRenderer {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockUpnpRenderer {
    /// Start a mock UPnP renderer on a random port
    pub async fn start() -> Self {
        Self::start_with_state(MockUpnpState::default()).await
    }

    /// Start with custom initial state
    pub async fn start_with_state(initial_state: MockUpnpState) -> Self {
        let state = Arc::new(RwLock::new(initial_state));

        let app = Router::new()
            .route("/description.xml", get(handle_description))
            .route("/AVTransport/control", post(handle_av_transport))
            .route("/RenderingControl/control", post(handle_rendering_control))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Get the server address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the device description URL
    pub fn description_url(&self) -> String {
        format!("http://{}/description.xml", self.addr)
    }

    pub fn av_transport_url(&self) -> String {
        format!("http://{}/AVTransport/control", self.addr)
    }

    pub fn rendering_control_url(&self) -> String {
        format!("http://{}/RenderingControl/control", self.addr)
    }

    /// Get the UDN as advertised (`uuid:` prefixed)
    pub async fn udn(&self) -> String {
        format!("uuid:{}", self.state.read().await.uuid)
    }

    pub async fn transport_state(&self) -> String {
        self.state.read().await.state.clone()
    }

    pub async fn volume(&self) -> u32 {
        self.state.read().await.volume
    }

    pub async fn muted(&self) -> bool {
        self.state.read().await.muted
    }

    /// Make `action` answer with a UPnP fault from now on
    pub async fn fail_action(&self, action: &str) {
        self.state.write().await.fail_action = Some(action.to_string());
    }

    /// Every SOAP action received so far, in order
    pub async fn actions(&self) -> Vec<RecordedAction> {
        self.state.read().await.actions.clone()
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

fn services_xml(version: u8) -> String {
    format!(
        r#"<serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:{v}</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <controlURL>/AVTransport/control</controlURL>
        <eventSubURL>/AVTransport/event</eventSubURL>
        <SCPDURL>/AVTransport/scpd.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:{v}</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <controlURL>RenderingControl/control</controlURL>
        <eventSubURL>/RenderingControl/event</eventSubURL>
        <SCPDURL>/RenderingControl/scpd.xml</SCPDURL>
      </service>
    </serviceList>"#,
        v = version
    )
}

/// Handle device description request
async fn handle_description(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let services = services_xml(state.service_version);

    let (root_services, embedded) = if state.embedded_services {
        (
            String::new(),
            format!(
                r#"<deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <friendlyName>{} Renderer</friendlyName>
        <UDN>uuid:{}-renderer</UDN>
        {}
      </device>
    </deviceList>"#,
                state.name, state.uuid, services
            ),
        )
    } else {
        (services, String::new())
    };

    let xml = format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>{}</friendlyName>
    <manufacturer>{}</manufacturer>
    <modelName>{}</modelName>
    <UDN>uuid:{}</UDN>
    {}
    {}
  </device>
</root>"#,
        state.name, state.manufacturer, state.model, state.uuid, root_services, embedded
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .body(Body::from(xml))
        .unwrap()
}

fn soap_action_header(headers: &HeaderMap) -> String {
    headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim_matches('"')
        .to_string()
}

fn ok_response(service: &str, version: u8, action: &str) -> Response {
    let body = format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:{a}Response xmlns:u="urn:schemas-upnp-org:service:{s}:{v}">
    </u:{a}Response>
  </s:Body>
</s:Envelope>"#,
        a = action,
        s = service,
        v = version
    );
    Response::builder()
        .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

fn fault_response(code: u32, description: &str) -> Response {
    let body = format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>{}</errorCode>
          <errorDescription>{}</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        code, description
    );
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

/// Record the action and return its name, or the fault to answer with
async fn record(
    state: &SharedState,
    headers: &HeaderMap,
    body: String,
) -> Result<(String, u8), Response> {
    let soap_action = soap_action_header(headers);
    let action = soap_action
        .rsplit_once('#')
        .map(|(_, a)| a.to_string())
        .unwrap_or_default();

    let mut guard = state.write().await;
    guard.actions.push(RecordedAction {
        soap_action,
        action: action.clone(),
        body,
    });

    if guard.fail_action.as_deref() == Some(action.as_str()) {
        return Err(fault_response(701, "Transition not available"));
    }
    Ok((action, guard.service_version))
}

/// Handle AVTransport SOAP requests
async fn handle_av_transport(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let (action, version) = match record(&state, &headers, body).await {
        Ok(a) => a,
        Err(fault) => return fault,
    };

    let new_state = match action.as_str() {
        "Play" => Some("PLAYING"),
        "Pause" => Some("PAUSED_PLAYBACK"),
        "Stop" => Some("STOPPED"),
        "Next" | "Previous" => None,
        _ => return fault_response(401, "Invalid Action"),
    };

    if let Some(s) = new_state {
        state.write().await.state = s.to_string();
    }
    ok_response("AVTransport", version, &action)
}

/// Handle RenderingControl SOAP requests
async fn handle_rendering_control(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let (action, version) = match record(&state, &headers, body.clone()).await {
        Ok(a) => a,
        Err(fault) => return fault,
    };

    match action.as_str() {
        "SetMute" => {
            let muted = extract_xml_value(&body, "DesiredMute").as_deref() == Some("1");
            state.write().await.muted = muted;
        }
        "SetVolume" => {
            let Some(volume) = extract_xml_value(&body, "DesiredVolume")
                .and_then(|v| v.trim().parse::<u32>().ok())
            else {
                return fault_response(402, "Invalid Args");
            };
            state.write().await.volume = volume.min(100);
        }
        _ => return fault_response(401, "Invalid Action"),
    }

    ok_response("RenderingControl", version, &action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_upnp_starts_and_stops() {
        let server = MockUpnpRenderer::start().await;
        let addr = server.addr();
        assert!(addr.port() > 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn mock_upnp_returns_description() {
        let server = MockUpnpRenderer::start().await;

        let response = reqwest::Client::new()
            .get(server.description_url())
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(response.contains("Mock UPnP Renderer"));
        assert!(response.contains("MediaRenderer"));

        server.stop().await;
    }
}
