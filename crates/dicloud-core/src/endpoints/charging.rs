//! Smart-charging status and controls.

use tracing::instrument;

use crate::client::Core;
use crate::error::CoreResult;
use crate::models::charging::ChargingStatus;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

/// Fetch the smart-charge home page and merge it into the `charging`
/// section.
#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn fetch_charging(
    core: &Core,
    session: &Session,
    vin: &str,
) -> CoreResult<ChargingStatus> {
    let inner = super::inner_with_vin(core, vin);
    let decoded = super::post_token_json(core, session, super::CHARGING_HOME, inner).await?;
    let status = ChargingStatus::from_value(&decoded);

    let observed = status.observed_at_ms.unwrap_or_else(crate::time::now_ms);
    core.store.apply(
        &StateEvent::new(vin, Section::Charging, Origin::Rest, observed)
            .with_fields(status.patch()),
    );
    Ok(status)
}

/// Toggle smart charging on or off.
#[instrument(skip_all, fields(vin = vin, enable = enable))]
pub(crate) async fn set_smart_charging(
    core: &Core,
    session: &Session,
    vin: &str,
    enable: bool,
) -> CoreResult<()> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("smartChargeSwitch".into(), if enable { "1" } else { "0" }.into());
    super::post_token_json(core, session, super::SMART_CHARGE_TOGGLE, inner).await?;
    Ok(())
}

/// A charging window with a target state of charge.
#[derive(Debug, Clone, Copy)]
pub struct ChargingSchedule {
    pub target_soc: u8,
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
}

/// Save or update the vehicle's smart-charging schedule.
#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn save_charging_schedule(
    core: &Core,
    session: &Session,
    vin: &str,
    schedule: ChargingSchedule,
) -> CoreResult<()> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("targetSoc".into(), schedule.target_soc.to_string());
    inner.insert("startHour".into(), schedule.start_hour.to_string());
    inner.insert("startMinute".into(), schedule.start_minute.to_string());
    inner.insert("endHour".into(), schedule.end_hour.to_string());
    inner.insert("endMinute".into(), schedule.end_minute.to_string());
    super::post_token_json(core, session, super::SMART_CHARGE_SAVE, inner).await?;
    Ok(())
}
