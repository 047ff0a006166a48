//! Remote control wire calls: trigger, result polling, PIN verification.
//!
//! These are thin wire adapters; completion racing, retries, and overlays
//! live in the command orchestrator.

use serde_json::{Map, Value};
use tracing::instrument;

use dicloud_crypto::digest::md5_hex_upper;

use crate::client::Core;
use crate::error::CoreResult;
use crate::models::control::{CommandCode, ControlResult};
use crate::session::Session;

/// Send the command trigger. `params`, when present, is serialized to a
/// single JSON string under `controlParamsMap`.
#[instrument(skip_all, fields(vin = vin, command = %command))]
pub(crate) async fn trigger(
    core: &Core,
    session: &Session,
    vin: &str,
    command: CommandCode,
    params: Option<&Map<String, Value>>,
    command_pwd: &str,
) -> CoreResult<ControlResult> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("commandType".into(), command.wire().to_string());
    inner.insert("commandPwd".into(), command_pwd.to_string());
    if let Some(params) = params {
        inner.insert(
            "controlParamsMap".into(),
            Value::Object(params.clone()).to_string(),
        );
    }
    let decoded = super::post_token_json(core, session, super::REMOTE_CONTROL, inner).await?;
    Ok(ControlResult::from_value(&decoded))
}

/// Poll the command result for a previously issued serial.
#[instrument(skip_all, fields(vin = vin, command = %command, serial = serial))]
pub(crate) async fn poll_result(
    core: &Core,
    session: &Session,
    vin: &str,
    command: CommandCode,
    serial: &str,
) -> CoreResult<ControlResult> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("commandType".into(), command.wire().to_string());
    inner.insert("requestSerial".into(), serial.to_string());
    let decoded = super::post_token_json(core, session, super::REMOTE_CONTROL_RESULT, inner).await?;
    Ok(ControlResult::from_value(&decoded))
}

/// Verify the control PIN without executing a command.
#[instrument(skip_all, fields(vin = vin))]
pub(crate) async fn verify_control_password(
    core: &Core,
    session: &Session,
    vin: &str,
    pin: &str,
) -> CoreResult<()> {
    let mut inner = super::inner_with_vin(core, vin);
    inner.insert("commandPwd".into(), md5_hex_upper(pin));
    super::post_token_json(core, session, super::VERIFY_CONTROL_PASSWORD, inner).await?;
    Ok(())
}
