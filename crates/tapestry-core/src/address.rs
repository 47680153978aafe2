//! Network identity of a panel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Address validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("panel address is empty")]
    Empty,
    #[error("panel address {0:?} contains invalid character {1:?}")]
    InvalidCharacter(String, char),
    #[error("panel address {0:?} has an empty or malformed host label")]
    MalformedHost(String),
    #[error("panel address {0:?} has an invalid port")]
    InvalidPort(String),
}

/// `host[:port]` of a panel, unique within a layout.
///
/// Hosts are DNS names or IPv4 literals; anything that would need escaping in
/// a URL authority is rejected. Addresses compare case-insensitively because
/// they are stored lower-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PanelAddress(String);

impl PanelAddress {
    /// Validate and normalize an address.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let (host, port) = match trimmed.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (trimmed, None),
        };

        if let Some(port) = port {
            match port.parse::<u16>() {
                Ok(p) if p > 0 => {}
                _ => return Err(AddressError::InvalidPort(trimmed.to_owned())),
            }
        }

        if let Some(c) = host
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '.'))
        {
            return Err(AddressError::InvalidCharacter(trimmed.to_owned(), c));
        }

        let labels_ok = host
            .split('.')
            .all(|l| !l.is_empty() && !l.starts_with('-') && !l.ends_with('-'));
        if !labels_ok {
            return Err(AddressError::MalformedHost(trimmed.to_owned()));
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part without the port.
    pub fn host(&self) -> &str {
        self.0
            .rsplit_once(':')
            .map(|(h, _)| h)
            .unwrap_or(self.0.as_str())
    }

    /// Port, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.0.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
    }

    /// `http://{address}/{path}` for this panel.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = Url::parse(&format!("http://{}/", self.0))?;
        base.join(path.trim_start_matches('/'))
    }
}

impl fmt::Display for PanelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PanelAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PanelAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PanelAddress> for String {
    fn from(value: PanelAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for PanelAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hosts_ips_and_ports() {
        for raw in ["epd-01", "epd-01.local", "192.168.4.17", "10.0.0.2:8080"] {
            assert!(PanelAddress::parse(raw).is_ok(), "{raw} should parse");
        }
        let a = PanelAddress::parse("10.0.0.2:8080").unwrap();
        assert_eq!(a.host(), "10.0.0.2");
        assert_eq!(a.port(), Some(8080));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(PanelAddress::parse("  "), Err(AddressError::Empty));
        assert!(matches!(
            PanelAddress::parse("http://epd"),
            Err(AddressError::InvalidCharacter(..) | AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            PanelAddress::parse("epd..local"),
            Err(AddressError::MalformedHost(_))
        ));
        assert!(matches!(
            PanelAddress::parse("epd:0"),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            PanelAddress::parse("epd 1"),
            Err(AddressError::InvalidCharacter(_, ' '))
        ));
    }

    #[test]
    fn normalizes_case_and_builds_endpoints() {
        let a = PanelAddress::parse("EPD-Left.local").unwrap();
        assert_eq!(a.as_str(), "epd-left.local");
        assert_eq!(
            a.endpoint("/draw").unwrap().as_str(),
            "http://epd-left.local/draw"
        );
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: PanelAddress = serde_json::from_str("\"epd-3\"").unwrap();
        assert_eq!(ok.as_str(), "epd-3");
        assert!(serde_json::from_str::<PanelAddress>("\"\"").is_err());
    }
}
