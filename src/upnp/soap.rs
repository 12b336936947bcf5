//! SOAP envelope plumbing for UPnP control actions

use regex::Regex;
use reqwest::Client;

use super::ControlError;

/// Invoke `action` on a UPnP service control URL.
///
/// `args` are `(name, value)` pairs rendered in order as the action's
/// in-arguments. Returns the raw response body on success.
pub async fn soap_call(
    http: &Client,
    url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, String)],
) -> Result<String, ControlError> {
    let body_content: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape_text(value)))
        .collect();

    let soap_body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:{action} xmlns:u="{service_type}">{body}</u:{action}>
  </s:Body>
</s:Envelope>"#,
        action = action,
        service_type = service_type,
        body = body_content
    );

    tracing::debug!("SOAP {}#{} -> {}", service_type, action, url);

    let response = http
        .post(url)
        .header("Content-Type", "text/xml; charset=utf-8")
        .header("SOAPAction", format!("\"{}#{}\"", service_type, action))
        .body(soap_body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        return Ok(text);
    }

    if let Some(fault) = parse_fault(&text) {
        return Err(fault);
    }

    Err(ControlError::Status {
        status: status.as_u16(),
        body: text,
    })
}

/// Decode a UPnP error carried in a SOAP fault body
pub fn parse_fault(xml: &str) -> Option<ControlError> {
    let code = extract_xml_value(xml, "errorCode")?.trim().parse().ok()?;
    let description = extract_xml_value(xml, "errorDescription").unwrap_or_default();
    Some(ControlError::Fault { code, description })
}

/// Extract XML value, handling optional namespace prefixes (e.g., <u:Volume> or <Volume>)
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(
        r"<(?:[^:>]+:)?{}\b[^>]*>([^<]*)</(?:[^:>]+:)?{}>",
        regex::escape(tag),
        regex::escape(tag)
    );

    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
