//! Push-broker discovery.

use tracing::instrument;

use crate::client::Core;
use crate::error::{CoreError, CoreResult};
use crate::normalize;
use crate::session::Session;

const DEFAULT_PORT: u16 = 8883;

/// Resolve the MQTT broker for the current session.
#[instrument(skip_all)]
pub(crate) async fn fetch_broker(core: &Core, session: &Session) -> CoreResult<(String, u16)> {
    let inner = core.codec.inner_base(crate::time::now_ms());
    let decoded = super::post_token_json(core, session, super::BROKER_DISCOVERY, inner).await?;

    // The production field name is misspelled; accept the corrected form too.
    let broker = decoded
        .get("emqBorker")
        .or_else(|| decoded.get("emqBroker"))
        .and_then(normalize::as_string)
        .ok_or_else(|| CoreError::Protocol {
            endpoint: super::BROKER_DISCOVERY.into(),
            detail: "missing emqBorker".into(),
        })?;
    parse_broker(&broker).ok_or_else(|| CoreError::Protocol {
        endpoint: super::BROKER_DISCOVERY.into(),
        detail: format!("unparseable broker value: {broker}"),
    })
}

/// Parse `host[:port]`, tolerating scheme and path decorations.
fn parse_broker(raw: &str) -> Option<(String, u16)> {
    let mut value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Some((_, rest)) = value.split_once("://") {
        value = rest;
    }
    if let Some((host_port, _)) = value.split_once('/') {
        value = host_port;
    }
    if value.is_empty() {
        return None;
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            if let Ok(port) = port.parse::<u16>() {
                Some((host.to_string(), port))
            } else {
                Some((value.to_string(), DEFAULT_PORT))
            }
        }
        _ => Some((value.to_string(), DEFAULT_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_broker_shapes() {
        assert_eq!(parse_broker("mq.example.com:8883"), Some(("mq.example.com".into(), 8883)));
        assert_eq!(parse_broker("mq.example.com"), Some(("mq.example.com".into(), 8883)));
        assert_eq!(
            parse_broker("ssl://mq.example.com:1883/path"),
            Some(("mq.example.com".into(), 1883))
        );
        assert_eq!(parse_broker("10.0.0.1:bad"), Some(("10.0.0.1:bad".into(), 8883)));
        assert_eq!(parse_broker("  "), None);
    }
}
