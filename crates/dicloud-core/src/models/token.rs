//! Login token payload.

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::normalize;

/// Token triple returned by a successful login.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub user_id: String,
    pub sign_token: String,
    pub encry_token: String,
}

impl AuthToken {
    /// Extract the token from a decrypted login `respondData` payload.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if any of the three token fields is absent.
    pub fn from_respond_data(payload: &Value) -> CoreResult<Self> {
        let token = payload.get("token").ok_or_else(|| CoreError::Protocol {
            endpoint: crate::endpoints::LOGIN.into(),
            detail: "login response missing token".into(),
        })?;
        let get = |key: &str| {
            token
                .get(key)
                .and_then(normalize::as_string)
                .ok_or_else(|| CoreError::Protocol {
                    endpoint: crate::endpoints::LOGIN.into(),
                    detail: format!("login token missing {key}"),
                })
        };
        Ok(Self {
            user_id: get("userId")?,
            sign_token: get("signToken")?,
            encry_token: get("encryToken")?,
        })
    }
}
