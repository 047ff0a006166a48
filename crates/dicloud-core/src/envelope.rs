//! Envelope assembly and parsing.
//!
//! A request is built inside-out: the inner field map is AES-encrypted into
//! `encryData`, the outer JSON is signed (SHA-1 sign + MD5 checkcode), then
//! the whole outer object runs through the white-box codec and ships as
//! `{"request": "<encoded>"}`. Responses mirror the shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::trace;

use dicloud_crypto::digest::md5_hex_upper;
use dicloud_crypto::sign::{checkcode, sign, SignIdentity};
use dicloud_crypto::{aes, WhiteBoxCodec};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::session::Session;
use crate::time::{now_ms, MonotonicMillis};

/// Parsed outer response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub code: String,
    pub message: String,
    /// Decrypted inner payload; `None` when `respondData` was empty.
    pub respond_data: Option<Value>,
}

/// Builds signed request envelopes and parses response envelopes.
pub struct EnvelopeCodec {
    config: Arc<CoreConfig>,
    wbox: WhiteBoxCodec,
    req_clock: MonotonicMillis,
}

impl EnvelopeCodec {
    /// # Errors
    ///
    /// Fails if the embedded white-box table artifact is invalid.
    pub fn new(config: Arc<CoreConfig>) -> CoreResult<Self> {
        Ok(Self {
            config,
            wbox: WhiteBoxCodec::new()?,
            req_clock: MonotonicMillis::new(),
        })
    }

    /// 32 uppercase hex chars of fresh randomness for the inner payload.
    #[must_use]
    pub fn random_hex32() -> String {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        hex::encode_upper(bytes)
    }

    /// Standard inner fields shared by every endpoint.
    #[must_use]
    pub fn inner_base(&self, now: i64) -> BTreeMap<String, String> {
        let d = &self.config.device;
        BTreeMap::from([
            ("deviceType".into(), d.device_type.clone()),
            ("imeiMD5".into(), d.imei_md5.clone()),
            ("networkType".into(), d.network_type.clone()),
            ("random".into(), Self::random_hex32()),
            ("timeStamp".into(), now.to_string()),
            ("version".into(), self.config.app_inner_version.clone()),
        ])
    }

    /// Strictly monotonic request timestamp (epoch ms).
    #[must_use]
    pub fn next_req_timestamp(&self) -> i64 {
        self.req_clock.next()
    }

    fn device_outer_fields(&self, outer: &mut Map<String, Value>) {
        let d = &self.config.device;
        outer.insert("ostype".into(), json!(d.ostype));
        outer.insert("imei".into(), json!(d.imei));
        outer.insert("mac".into(), json!(d.mac));
        outer.insert("model".into(), json!(d.model));
        outer.insert("sdk".into(), json!(d.sdk));
        outer.insert("mod".into(), json!(d.mod_name));
    }

    fn wrap(&self, outer: &Map<String, Value>) -> String {
        let outer_json = Value::Object(outer.clone()).to_string();
        let encoded = self.wbox.encode_envelope(outer_json.as_bytes());
        json!({ "request": encoded }).to_string()
    }

    /// Build a signed request for an authenticated endpoint.
    ///
    /// # Errors
    ///
    /// Fails if inner encryption fails.
    pub fn build_token_request(
        &self,
        session: &Session,
        inner: &BTreeMap<String, String>,
    ) -> CoreResult<String> {
        let cfg = &self.config;
        let req_timestamp = self.next_req_timestamp().to_string();
        let service_time = now_ms().to_string();

        let inner_json = serde_json::to_string(inner).expect("string map serializes");
        let encry_data = aes::encrypt_hex(&inner_json, &session.content_key)?;

        let identity = SignIdentity {
            country_code: &cfg.country_code,
            identifier: &session.user_id,
            imei_md5: &cfg.device.imei_md5,
            language: &cfg.language,
            req_timestamp: &req_timestamp,
        };
        let signature = sign(inner, &identity, &session.sign_key);
        let check = checkcode(
            &session.user_id,
            &cfg.device.imei_md5,
            &req_timestamp,
            &service_time,
            &session.sign_key,
        );

        let mut outer = Map::new();
        outer.insert("countryCode".into(), json!(cfg.country_code));
        outer.insert("encryData".into(), json!(encry_data));
        outer.insert("identifier".into(), json!(session.user_id));
        outer.insert("imeiMD5".into(), json!(cfg.device.imei_md5));
        outer.insert("language".into(), json!(cfg.language));
        outer.insert("reqTimestamp".into(), json!(req_timestamp));
        outer.insert("sign".into(), json!(signature));
        self.device_outer_fields(&mut outer);
        outer.insert("serviceTime".into(), json!(service_time));
        outer.insert("checkcode".into(), json!(check));

        Ok(self.wrap(&outer))
    }

    /// Build the login request. Signing and inner encryption both key off
    /// `MD5(password)` since no session exists yet.
    ///
    /// # Errors
    ///
    /// Fails if inner encryption fails.
    pub fn build_login_request(&self) -> CoreResult<String> {
        let cfg = &self.config;
        let d = &cfg.device;
        let req_timestamp = self.next_req_timestamp().to_string();
        let service_time = now_ms().to_string();
        let login_key = md5_hex_upper(&cfg.password);

        let mut inner = self.inner_base(now_ms());
        inner.insert("timeStamp".into(), req_timestamp.clone());
        inner.insert("appInnerVersion".into(), cfg.app_inner_version.clone());
        inner.insert("appVersion".into(), cfg.app_version.clone());
        inner.insert("deviceName".into(), format!("{}{}", d.mobile_brand, d.mobile_model));
        inner.insert("isAuto".into(), cfg.is_auto.clone());
        inner.insert("mobileBrand".into(), d.mobile_brand.clone());
        inner.insert("mobileModel".into(), d.mobile_model.clone());
        inner.insert("osType".into(), d.os_type.clone());
        inner.insert("osVersion".into(), d.os_version.clone());
        inner.insert("softType".into(), cfg.soft_type.clone());
        inner.insert("timeZone".into(), cfg.time_zone.clone());

        let inner_json = serde_json::to_string(&inner).expect("string map serializes");
        let encry_data = aes::encrypt_hex(&inner_json, &login_key)?;

        let mut sign_fields = inner.clone();
        sign_fields.insert("functionType".into(), "pwdLogin".into());
        sign_fields.insert("identifierType".into(), "0".into());
        let identity = SignIdentity {
            country_code: &cfg.country_code,
            identifier: &cfg.username,
            imei_md5: &d.imei_md5,
            language: &cfg.language,
            req_timestamp: &req_timestamp,
        };
        let signature = sign(&sign_fields, &identity, &login_key);
        let check = checkcode(&cfg.username, &d.imei_md5, &req_timestamp, &service_time, &login_key);

        let mut outer = Map::new();
        outer.insert("countryCode".into(), json!(cfg.country_code));
        outer.insert("encryData".into(), json!(encry_data));
        outer.insert("functionType".into(), json!("pwdLogin"));
        outer.insert("identifier".into(), json!(cfg.username));
        outer.insert("identifierType".into(), json!("0"));
        outer.insert("imeiMD5".into(), json!(d.imei_md5));
        outer.insert("isAuto".into(), json!(cfg.is_auto));
        outer.insert("language".into(), json!(cfg.language));
        outer.insert("reqTimestamp".into(), json!(req_timestamp));
        outer.insert("sign".into(), json!(signature));
        outer.insert("signKey".into(), json!(cfg.password));
        self.device_outer_fields(&mut outer);
        outer.insert("serviceTime".into(), json!(service_time));
        outer.insert("checkcode".into(), json!(check));

        Ok(self.wrap(&outer))
    }

    /// Parse a response body: unwrap, white-box decode, decrypt respondData.
    ///
    /// # Errors
    ///
    /// Protocol errors on malformed envelopes; crypto errors on cipher
    /// failures.
    pub fn parse_response(
        &self,
        body: &str,
        endpoint: &str,
        content_key: &str,
    ) -> CoreResult<ApiResponse> {
        let protocol = |detail: String| CoreError::Protocol {
            endpoint: endpoint.to_string(),
            detail,
        };

        let wrapper: Value = serde_json::from_str(body)
            .map_err(|e| protocol(format!("body is not JSON: {e}")))?;
        let encoded = wrapper
            .get("response")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| protocol("missing response field".into()))?;

        let decoded = self.wbox.decode_envelope(encoded)?;
        let text = String::from_utf8(decoded)
            .map_err(|_| protocol("envelope is not UTF-8".into()))?;
        let trimmed = text.trim();
        // Some responses arrive with a stray marker before the JSON.
        let cleaned = if trimmed.starts_with("F{") || trimmed.starts_with("F[") {
            &trimmed[1..]
        } else {
            trimmed
        };

        let outer: Value = serde_json::from_str(cleaned)
            .map_err(|e| protocol(format!("envelope is not JSON: {e}")))?;
        let code = match outer.get("code") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let message = outer
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let respond_data = match outer.get("respondData").and_then(Value::as_str) {
            Some(hex_ct) if !hex_ct.is_empty() => {
                let plain = aes::decrypt_utf8(hex_ct, content_key)?;
                trace!(endpoint, "decrypted respondData");
                Some(
                    serde_json::from_str(&plain)
                        .map_err(|e| protocol(format!("respondData is not JSON: {e}")))?,
                )
            }
            _ => None,
        };

        Ok(ApiResponse {
            code,
            message,
            respond_data,
        })
    }
}
