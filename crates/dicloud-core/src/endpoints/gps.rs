//! Vehicle location via trigger + poll.

use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::client::Core;
use crate::error::{CoreError, CoreResult};
use crate::models::gps::GpsInfo;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

async fn fetch(
    core: &Core,
    session: &Session,
    endpoint: &str,
    vin: &str,
    serial: Option<&str>,
) -> CoreResult<GpsInfo> {
    let mut inner = super::inner_with_vin(core, vin);
    if let Some(serial) = serial {
        inner.insert("requestSerial".into(), serial.to_string());
    }
    let decoded = super::post_token_json(core, session, endpoint, inner).await?;
    Ok(GpsInfo::from_value(&decoded))
}

/// Trigger a location report and poll until coordinates arrive.
#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn poll_gps(core: &Core, session: &Session, vin: &str) -> CoreResult<GpsInfo> {
    let mut info = fetch(core, session, super::GPS_TRIGGER, vin, None).await?;
    let mut serial = info.request_serial.clone();

    if !info.is_ready() {
        for attempt in 1..=core.config.poll_attempts {
            sleep(core.config.poll_interval).await;
            match fetch(core, session, super::GPS_POLL, vin, serial.as_deref()).await {
                Ok(next) => {
                    if next.request_serial.is_some() {
                        serial = next.request_serial.clone();
                    }
                    info = next;
                    if info.is_ready() {
                        break;
                    }
                }
                Err(CoreError::Api { code, .. }) => {
                    debug!(vin, attempt, %code, "gps poll attempt failed");
                }
                Err(other) => return Err(other),
            }
        }
    }

    if info.is_ready() {
        let observed = info.observed_at_ms.unwrap_or_else(crate::time::now_ms);
        core.store.apply(
            &StateEvent::new(vin, Section::Gps, Origin::Rest, observed).with_fields(info.patch()),
        );
    }
    Ok(info)
}
