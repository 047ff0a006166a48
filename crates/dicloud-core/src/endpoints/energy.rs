//! Energy consumption report. Only exposed for some vehicle models; the
//! service answers 1001 elsewhere, which surfaces as an API error here
//! (the endpoint is outside the control family).

use tracing::instrument;

use crate::client::Core;
use crate::error::CoreResult;
use crate::models::energy::EnergyConsumption;
use crate::session::Session;
use crate::state::{Origin, Section, StateEvent};

#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn fetch_energy(
    core: &Core,
    session: &Session,
    vin: &str,
) -> CoreResult<EnergyConsumption> {
    let inner = super::inner_with_vin(core, vin);
    let decoded = super::post_token_json(core, session, super::ENERGY, inner).await?;
    let energy = EnergyConsumption::from_value(&decoded);

    let observed = energy.observed_at_ms.unwrap_or_else(crate::time::now_ms);
    core.store.apply(
        &StateEvent::new(vin, Section::Energy, Origin::Rest, observed).with_fields(energy.patch()),
    );
    Ok(energy)
}
