//! Endpoint adapters: build the inner payload, post, validate, normalize,
//! and emit a state event. Adapters never retry; retry policy lives in the
//! transport (network) and the command orchestrator (rate limits).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::client::Core;
use crate::error::CoreResult;
use crate::session::Session;

pub mod broker;
pub mod charging;
pub mod control;
pub mod energy;
pub mod gps;
pub mod hvac;
pub mod login;
pub mod realtime;
pub mod vehicles;

pub const LOGIN: &str = "/app/account/login";
pub const VEHICLE_LIST: &str = "/app/account/getAllListByUserId";
pub const REALTIME_TRIGGER: &str = "/vehicleInfo/vehicle/vehicleRealTimeRequest";
pub const REALTIME_POLL: &str = "/vehicleInfo/vehicle/vehicleRealTimeResult";
pub const HVAC_STATUS: &str = "/control/getStatusNow";
pub const GPS_TRIGGER: &str = "/control/getGpsInfo";
pub const GPS_POLL: &str = "/control/getGpsInfoResult";
pub const CHARGING_HOME: &str = "/control/smartCharge/homePage";
pub const SMART_CHARGE_TOGGLE: &str = "/control/smartCharge/changeChargeStatue";
pub const SMART_CHARGE_SAVE: &str = "/control/smartCharge/saveOrUpdate";
pub const ENERGY: &str = "/vehicleInfo/vehicle/getEnergyConsumption";
pub const VERIFY_CONTROL_PASSWORD: &str = "/vehicle/vehicleswitch/verifyControlPassword";
pub const REMOTE_CONTROL: &str = "/control/remoteControl";
pub const REMOTE_CONTROL_RESULT: &str = "/control/remoteControlResult";
pub const BROKER_DISCOVERY: &str = "/app/emqAuth/getEmqBrokerIp";

/// Build, post, and decode one token-authenticated request, returning the
/// decrypted `respondData` (JSON null when the server sent none).
pub(crate) async fn post_token_json(
    core: &Core,
    session: &Session,
    endpoint: &str,
    inner: BTreeMap<String, String>,
) -> CoreResult<Value> {
    let wire = core.codec.build_token_request(session, &inner)?;
    let response = core
        .transport
        .post_checked(endpoint, wire, &session.content_key)
        .await?;
    Ok(response.respond_data.unwrap_or(Value::Null))
}

/// Standard inner fields plus a VIN.
pub(crate) fn inner_with_vin(core: &Core, vin: &str) -> BTreeMap<String, String> {
    let mut inner = core.codec.inner_base(crate::time::now_ms());
    inner.insert("vin".into(), vin.to_string());
    inner
}
