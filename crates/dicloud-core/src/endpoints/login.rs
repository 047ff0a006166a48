//! Account login.

use tracing::{debug, instrument};

use dicloud_crypto::digest::md5_hex_upper;

use crate::client::Core;
use crate::error::{CoreError, CoreResult};
use crate::models::AuthToken;
use crate::session::Session;

/// Authenticate and derive a fresh session from the returned token triple.
#[instrument(skip_all)]
pub(crate) async fn login(core: &Core) -> CoreResult<Session> {
    let wire = core.codec.build_login_request()?;
    let login_key = md5_hex_upper(&core.config.password);
    let response = core
        .transport
        .post_raw(super::LOGIN, wire, &login_key)
        .await?;

    if response.code != "0" {
        return Err(CoreError::from_server_code(
            &response.code,
            &response.message,
            super::LOGIN,
        ));
    }
    let payload = response.respond_data.ok_or_else(|| CoreError::Protocol {
        endpoint: super::LOGIN.into(),
        detail: "login response missing respondData".into(),
    })?;
    let token = AuthToken::from_respond_data(&payload)?;
    debug!(user_id = %token.user_id, "login succeeded");
    Ok(Session::from_tokens(
        token.user_id,
        &token.sign_token,
        &token.encry_token,
    ))
}
