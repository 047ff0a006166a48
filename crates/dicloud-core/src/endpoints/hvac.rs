//! Climate status snapshot.

use tracing::instrument;

use crate::client::Core;
use crate::error::CoreResult;
use crate::models::hvac::HvacStatus;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn fetch_hvac(core: &Core, session: &Session, vin: &str) -> CoreResult<HvacStatus> {
    let inner = super::inner_with_vin(core, vin);
    let decoded = super::post_token_json(core, session, super::HVAC_STATUS, inner).await?;
    let status = HvacStatus::from_value(&decoded);

    let observed = status.observed_at_ms.unwrap_or_else(crate::time::now_ms);
    core.store.apply(
        &StateEvent::new(vin, Section::Hvac, Origin::Rest, observed).with_fields(status.patch()),
    );
    Ok(status)
}
