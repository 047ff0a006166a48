//! Account vehicle list.

use serde_json::Value;
use tracing::instrument;

use crate::client::Core;
use crate::error::CoreResult;
use crate::models::Vehicle;
use crate::session::Session;

/// Fetch all vehicles bound to the account and record each vehicle's
/// permission tree for the command gate.
#[instrument(skip_all)]
pub(crate) async fn fetch_vehicles(core: &Core, session: &Session) -> CoreResult<Vec<Vehicle>> {
    let inner = core.codec.inner_base(crate::time::now_ms());
    let decoded = super::post_token_json(core, session, super::VEHICLE_LIST, inner).await?;

    let items = match decoded {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    let vehicles: Vec<Vehicle> = items.iter().filter_map(Vehicle::from_value).collect();

    {
        let mut permissions = core.permissions.lock();
        for vehicle in &vehicles {
            permissions.insert(vehicle.vin.clone(), vehicle.permissions.clone());
        }
    }
    Ok(vehicles)
}
