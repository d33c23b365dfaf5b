//! Connection links pasted or scanned by the user.
//!
//! `tc://?v=2&id=<client id>&r=<connect request>&ret=<strategy>` or the same
//! query on an https universal link.

use crate::core::protocol::{Origin, RawWireEvent, WireMethod, PROTOCOL_VERSION};
use crate::core::random_id;
use crate::error::{ConnectError, ConnectResult};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone)]
pub struct ConnectionLink {
    pub version: u8,
    pub client_id: String,
    pub request: Value,
    pub return_strategy: Option<String>,
}

impl ConnectionLink {
    pub fn parse(link: &str) -> ConnectResult<Self> {
        let url = Url::parse(link.trim()).map_err(|e| ConnectError::InvalidLink(e.to_string()))?;
        if !matches!(url.scheme(), "tc" | "https" | "http") {
            return Err(ConnectError::InvalidLink(format!("unsupported scheme: {}", url.scheme())));
        }

        let mut version = None;
        let mut client_id = None;
        let mut request = None;
        let mut return_strategy = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "v" => version = value.parse::<u8>().ok(),
                "id" => client_id = Some(value.into_owned()),
                "r" => request = Some(value.into_owned()),
                "ret" => return_strategy = Some(value.into_owned()),
                _ => {}
            }
        }

        let version = version.ok_or_else(|| ConnectError::InvalidLink("missing version".into()))?;
        if version != PROTOCOL_VERSION {
            return Err(ConnectError::InvalidLink(format!("unsupported version {version}")));
        }
        let client_id = client_id
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| ConnectError::InvalidLink("missing or malformed client id".into()))?;
        let raw = request.ok_or_else(|| ConnectError::InvalidLink("missing connect request".into()))?;
        let request: Value = serde_json::from_str(&raw)
            .map_err(|e| ConnectError::InvalidLink(format!("connect request: {e}")))?;
        if !request.is_object() {
            return Err(ConnectError::InvalidLink("connect request must be an object".into()));
        }

        Ok(Self {
            version,
            client_id: client_id.to_ascii_lowercase(),
            request,
            return_strategy,
        })
    }

    /// `startConnect` event addressed from the relay session of this link.
    pub fn into_event(self) -> RawWireEvent {
        RawWireEvent::new(
            random_id(),
            WireMethod::StartConnect.as_str(),
            Origin::remote(self.client_id),
            self.request,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: &str = "b8e1c7a0f2d44c5a9e2b7f6d1c0a9e8f7d6c5b4a39281706f5e4d3c2b1a09f8e";

    fn encoded(request: &str) -> String {
        url::form_urlencoded::byte_serialize(request.as_bytes()).collect()
    }

    #[test]
    fn parses_tc_link() {
        let r = encoded(r#"{"manifestUrl":"https://app.example/m.json","items":[{"name":"ton_addr"}]}"#);
        let link = ConnectionLink::parse(&format!("tc://?v=2&id={CLIENT}&r={r}&ret=none")).unwrap();
        assert_eq!(link.client_id, CLIENT);
        assert_eq!(link.request["manifestUrl"], "https://app.example/m.json");
        assert_eq!(link.return_strategy.as_deref(), Some("none"));

        let event = link.into_event();
        assert_eq!(event.wire_method(), Some(WireMethod::StartConnect));
        assert_eq!(event.origin, Origin::remote(CLIENT));
    }

    #[test]
    fn parses_universal_link() {
        let r = encoded(r#"{"manifestUrl":"https://app.example/m.json","items":[]}"#);
        let link = ConnectionLink::parse(&format!("https://wallet.example/connect?v=2&id={CLIENT}&r={r}")).unwrap();
        assert_eq!(link.version, 2);
    }

    #[test]
    fn rejects_bad_links() {
        let r = encoded(r#"{"manifestUrl":"x"}"#);
        assert!(ConnectionLink::parse(&format!("tc://?v=1&id={CLIENT}&r={r}")).is_err());
        assert!(ConnectionLink::parse(&format!("tc://?v=2&r={r}")).is_err());
        assert!(ConnectionLink::parse(&format!("tc://?v=2&id=zz&r={r}")).is_err());
        assert!(ConnectionLink::parse(&format!("tc://?v=2&id={CLIENT}&r=%7Bnope")).is_err());
        assert!(ConnectionLink::parse("mailto:someone@example.com").is_err());
    }
}
