//! Text carried by a calibration marker.

use serde::{Deserialize, Serialize};
use tapestry_core::{AddressError, PanelAddress};

/// Prefix of structured marker payloads.
pub const PAYLOAD_PREFIX: &str = "TAPESTRY:";

/// Structured marker content: `TAPESTRY:{json}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPayload {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width_px: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height_px: Option<u32>,
    /// Edge of the rendered code on the screen (px), quiet zone excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_px: Option<u32>,
}

impl MarkerPayload {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            panel_type: None,
            screen_width_px: None,
            screen_height_px: None,
            marker_px: None,
        }
    }

    /// Text to put into the marker.
    pub fn encode(&self) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("{PAYLOAD_PREFIX}{json}")
    }
}

/// Why decoded marker text is not a usable identity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadError {
    #[error("empty identity")]
    Empty,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("not a panel address: {0}")]
    InvalidAddress(String),
}

impl From<AddressError> for PayloadError {
    fn from(err: AddressError) -> Self {
        PayloadError::InvalidAddress(err.to_string())
    }
}

/// Identity decoded from marker text: a bare address or a structured payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerIdentity {
    pub address: PanelAddress,
    pub payload: Option<MarkerPayload>,
}

/// Parse decoded marker text into an address (and payload when structured).
pub fn parse_identity(text: &str) -> Result<MarkerIdentity, PayloadError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PayloadError::Empty);
    }

    if let Some(json) = text.strip_prefix(PAYLOAD_PREFIX) {
        let payload: MarkerPayload =
            serde_json::from_str(json).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        if payload.host.trim().is_empty() {
            return Err(PayloadError::Empty);
        }
        let address = PanelAddress::parse(&payload.host)?;
        return Ok(MarkerIdentity {
            address,
            payload: Some(payload),
        });
    }

    Ok(MarkerIdentity {
        address: PanelAddress::parse(text)?,
        payload: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payload_round_trips() {
        let mut p = MarkerPayload::new("epd-3.local:8080");
        p.panel_type = Some("ED097TC2".into());
        p.screen_width_px = Some(1200);
        p.screen_height_px = Some(1600);
        p.marker_px = Some(882);

        let text = p.encode();
        assert!(text.starts_with("TAPESTRY:{"));
        let id = parse_identity(&text).unwrap();
        assert_eq!(id.address.as_str(), "epd-3.local:8080");
        assert_eq!(id.payload, Some(p));
    }

    #[test]
    fn bare_address_is_accepted() {
        let id = parse_identity(" 192.168.1.40 ").unwrap();
        assert_eq!(id.address.as_str(), "192.168.1.40");
        assert!(id.payload.is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_identity("   "), Err(PayloadError::Empty));
        assert!(matches!(
            parse_identity("TAPESTRY:{not json"),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(
            parse_identity("hello world"),
            Err(PayloadError::InvalidAddress(_))
        ));
        assert_eq!(
            parse_identity(r#"TAPESTRY:{"host":""}"#),
            Err(PayloadError::Empty)
        );
    }
}
