//! Push ingestion over TLS MQTT.
//!
//! The listener discovers the broker through the REST API, connects with
//! session-derived credentials, and subscribes to the per-user topic. Each
//! message is double-decrypted (white-box body, inner AES payload) and
//! dispatched: telemetry merges into the store, command results resolve
//! their waiters, anything unknown is dropped. A malformed message is never
//! fatal to the listener.

use std::sync::Arc;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use serde_json::Value;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use dicloud_crypto::digest::md5_hex_upper;
use dicloud_crypto::{aes, WhiteBoxCodec};

use crate::client::Core;
use crate::config::CoreConfig;
use crate::endpoints::broker;
use crate::models::control::ControlResult;
use crate::models::realtime::RealtimeStatus;
use crate::normalize;
use crate::retry::ExponentialBackoff;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

/// Envelope types the listener consumes.
const EVENT_VEHICLE_INFO: &str = "vehicleInfo";
const EVENT_REMOTE_CONTROL: &str = "remoteControl";

/// Decoded push envelope: type tag, vehicle, and the decrypted payload.
#[derive(Debug)]
pub(crate) struct PushEnvelope {
    pub event: String,
    pub vin: Option<String>,
    pub payload: Value,
}

/// Client id is bound to the device identity the session was created with.
pub(crate) fn client_id(config: &CoreConfig) -> String {
    let imei_md5 = config.device.imei_md5.trim().to_uppercase();
    if !imei_md5.is_empty() && imei_md5.chars().any(|c| c != '0') {
        format!("oversea_{imei_md5}")
    } else {
        format!("oversea_{}", md5_hex_upper(&config.device.imei))
    }
}

/// Broker password: epoch seconds concatenated with a digest binding the
/// sign token, client id, and user id to that timestamp.
pub(crate) fn broker_password(session: &Session, client_id: &str, ts_seconds: i64) -> String {
    let digest = md5_hex_upper(&format!(
        "{}{}{}{}",
        session.sign_token(),
        client_id,
        session.user_id,
        ts_seconds
    ));
    format!("{ts_seconds}{digest}")
}

/// Decode one raw MQTT message body into a typed envelope.
pub(crate) fn decode_message(
    wbox: &WhiteBoxCodec,
    content_key: &str,
    body: &[u8],
) -> crate::error::CoreResult<PushEnvelope> {
    let text = std::str::from_utf8(body).map_err(|_| crate::error::CoreError::Protocol {
        endpoint: "push".into(),
        detail: "message body is not UTF-8".into(),
    })?;
    let decoded = wbox.decode_envelope(text.trim())?;
    let outer: Value =
        serde_json::from_slice(&decoded).map_err(|e| crate::error::CoreError::Protocol {
            endpoint: "push".into(),
            detail: format!("envelope is not JSON: {e}"),
        })?;

    let event = outer
        .get("event")
        .and_then(normalize::as_string)
        .unwrap_or_default();
    let vin = outer.get("vin").and_then(normalize::as_string);
    let respond_hex = outer
        .get("data")
        .and_then(|d| d.get("respondData"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let payload = if respond_hex.is_empty() {
        Value::Null
    } else {
        let plain = aes::decrypt_utf8(respond_hex, content_key)?;
        serde_json::from_str(&plain).map_err(|e| crate::error::CoreError::Protocol {
            endpoint: "push".into(),
            detail: format!("respondData is not JSON: {e}"),
        })?
    };

    Ok(PushEnvelope { event, vin, payload })
}

/// Route a decoded envelope into the store or the waiter registry.
pub(crate) fn dispatch(core: &Core, envelope: &PushEnvelope) {
    match envelope.event.as_str() {
        EVENT_VEHICLE_INFO => {
            let Some(vin) = envelope.vin.as_deref() else {
                debug!("vehicleInfo push without vin, dropping");
                return;
            };
            let status = RealtimeStatus::from_value(&envelope.payload);
            let observed = status.observed_at_ms.unwrap_or_else(crate::time::now_ms);
            core.store.apply(
                &StateEvent::new(vin, Section::Realtime, Origin::Push, observed)
                    .with_fields(status.patch()),
            );
        }
        EVENT_REMOTE_CONTROL => {
            let result = ControlResult::from_value(&envelope.payload);
            match result.request_serial.clone() {
                Some(serial) => {
                    let delivered = core.waiters.resolve(&serial, result);
                    debug!(%serial, delivered, "remoteControl push");
                }
                None => debug!("remoteControl push without requestSerial, dropping"),
            }
        }
        other => debug!(event = other, "unknown push envelope type, dropping"),
    }
}

fn tls_transport() -> Result<Transport, String> {
    let mut roots = rustls::RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| format!("loading native roots: {e}"))?;
    for cert in certs {
        // Skip anchors the verifier rejects rather than failing startup.
        let _ = roots.add(cert);
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Transport::Tls(TlsConfiguration::Rustls(Arc::new(config))))
}

enum ConnectionEnd {
    Cancelled,
    SessionChanged,
}

/// Run one broker connection until cancellation, session change, or error.
async fn run_connection(
    core: &Arc<Core>,
    session: &Arc<Session>,
    cancel: &CancellationToken,
) -> Result<ConnectionEnd, String> {
    let (host, port) = broker::fetch_broker(core, session)
        .await
        .map_err(|e| format!("broker discovery: {e}"))?;

    let client_id = client_id(&core.config);
    let topic = format!("oversea/res/{}", session.user_id);
    let mut options = MqttOptions::new(client_id.clone(), host.clone(), port);
    options.set_keep_alive(core.config.mqtt_keepalive);
    options.set_credentials(
        session.user_id.clone(),
        broker_password(session, &client_id, crate::time::now_ms() / 1000),
    );
    options.set_transport(tls_transport()?);

    info!(%host, port, %topic, "connecting to push broker");
    let (client, mut eventloop) = AsyncClient::new(options, 32);
    let wbox = WhiteBoxCodec::new().map_err(|e| e.to_string())?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = client.disconnect().await;
                return Ok(ConnectionEnd::Cancelled);
            }
            _ = core.sessions.wait_for_change() => {
                let _ = client.disconnect().await;
                return Ok(ConnectionEnd::SessionChanged);
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    debug!(%topic, "connected, subscribing");
                    client
                        .subscribe(topic.clone(), QoS::AtMostOnce)
                        .await
                        .map_err(|e| format!("subscribe: {e}"))?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match decode_message(&wbox, &session.content_key, &publish.payload) {
                        Ok(envelope) => dispatch(core, &envelope),
                        Err(err) => debug!(topic = %publish.topic, "dropping push message: {err}"),
                    }
                }
                Ok(_) => {}
                Err(err) => return Err(format!("connection: {err}")),
            }
        }
    }
}

/// Spawn the push listener task. Reconnects with capped, jittered backoff;
/// parks while no session is available.
pub(crate) fn spawn(core: Arc<Core>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        listener_loop(core, cancel).await;
    })
}

#[instrument(skip_all)]
async fn listener_loop(core: Arc<Core>, cancel: CancellationToken) {
    let backoff = ExponentialBackoff::reconnect();
    let mut failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let Some(session) = core.sessions.current() else {
            debug!("no session, push listener parked");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = core.sessions.wait_for_change() => continue,
            }
        };

        match run_connection(&core, &session, &cancel).await {
            Ok(ConnectionEnd::Cancelled) => return,
            Ok(ConnectionEnd::SessionChanged) => {
                failures = 0;
            }
            Err(err) => {
                let delay = backoff.delay(failures);
                failures = failures.saturating_add(1);
                warn!(?delay, "push connection failed ({err}), reconnecting");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    () = sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceIdentity;

    #[test]
    fn client_id_prefers_imei_md5() {
        let mut cfg = CoreConfig::new("u", "p");
        cfg.device = DeviceIdentity {
            imei_md5: "A1B2C3D4A1B2C3D4A1B2C3D4A1B2C3D4".into(),
            ..DeviceIdentity::default()
        };
        assert_eq!(client_id(&cfg), "oversea_A1B2C3D4A1B2C3D4A1B2C3D4A1B2C3D4");
    }

    #[test]
    fn client_id_falls_back_to_imei_digest() {
        let cfg = CoreConfig::new("u", "p");
        // Default imei_md5 is all zeros.
        assert_eq!(
            client_id(&cfg),
            format!("oversea_{}", md5_hex_upper(&cfg.device.imei))
        );
    }

    #[test]
    fn broker_password_shape() {
        let session = Session::from_tokens("1434", "S", "E");
        let pwd = broker_password(&session, "oversea_X", 1_770_817_900);
        assert!(pwd.starts_with("1770817900"));
        assert_eq!(pwd.len(), 10 + 32);
        assert_eq!(
            &pwd[10..],
            md5_hex_upper("Soversea_X14341770817900")
        );
    }

    #[test]
    fn decode_message_double_decrypts() {
        let wbox = WhiteBoxCodec::new().unwrap();
        let key = md5_hex_upper("E");
        let inner = aes::encrypt_hex("{\"requestSerial\":\"X1\",\"controlState\":1}", &key).unwrap();
        let outer = serde_json::json!({
            "event": "remoteControl",
            "vin": "V1",
            "data": {"respondData": inner}
        })
        .to_string();
        let body = wbox.encode_envelope(outer.as_bytes());

        let envelope = decode_message(&wbox, &key, body.as_bytes()).unwrap();
        assert_eq!(envelope.event, "remoteControl");
        assert_eq!(envelope.vin.as_deref(), Some("V1"));
        assert_eq!(envelope.payload["requestSerial"], "X1");
    }

    #[test]
    fn decode_message_rejects_garbage_without_panicking() {
        let wbox = WhiteBoxCodec::new().unwrap();
        let key = md5_hex_upper("E");
        assert!(decode_message(&wbox, &key, b"definitely not an envelope").is_err());
        assert!(decode_message(&wbox, &key, &[0xFF, 0xFE]).is_err());
    }
}
