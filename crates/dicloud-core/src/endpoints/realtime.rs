//! Realtime telemetry via trigger + poll.
//!
//! The trigger asks the vehicle to report; until it does, responses carry
//! `onlineState=0` and a `requestSerial` for follow-up polling.

use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::client::Core;
use crate::error::{CoreError, CoreResult};
use crate::models::realtime::RealtimeStatus;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

async fn fetch(
    core: &Core,
    session: &Session,
    endpoint: &str,
    vin: &str,
    serial: Option<&str>,
) -> CoreResult<RealtimeStatus> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("energyType".into(), "0".into());
    inner.insert("tboxVersion".into(), core.config.tbox_version.clone());
    if let Some(serial) = serial {
        inner.insert("requestSerial".into(), serial.to_string());
    }
    let decoded = super::post_token_json(core, session, endpoint, inner).await?;
    Ok(RealtimeStatus::from_value(&decoded))
}

/// Trigger a realtime report and poll until the vehicle answers or the
/// attempt budget runs out. Fresh data is merged into the `realtime`
/// section exactly once.
#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn poll_realtime(
    core: &Core,
    session: &Session,
    vin: &str,
) -> CoreResult<RealtimeStatus> {
    let mut status = fetch(core, session, super::REALTIME_TRIGGER, vin, None).await?;
    let mut serial = status.request_serial.clone();

    if !status.is_ready() {
        for attempt in 1..=core.config.poll_attempts {
            sleep(core.config.poll_interval).await;
            match fetch(core, session, super::REALTIME_POLL, vin, serial.as_deref()).await {
                Ok(next) => {
                    if next.request_serial.is_some() {
                        serial = next.request_serial.clone();
                    }
                    status = next;
                    if status.is_ready() {
                        break;
                    }
                }
                // Transient server-side refusals: keep polling.
                Err(CoreError::Api { code, .. }) => {
                    debug!(vin, attempt, %code, "realtime poll attempt failed");
                }
                Err(other) => return Err(other),
            }
        }
    }

    if status.is_ready() {
        let observed = status.observed_at_ms.unwrap_or_else(crate::time::now_ms);
        core.store.apply(
            &StateEvent::new(vin, Section::Realtime, Origin::Rest, observed)
                .with_fields(status.patch()),
        );
    } else {
        debug!(vin, "realtime poll exhausted without fresh data");
    }
    Ok(status)
}
