//! HTTP transport: envelope in, envelope out.
//!
//! One reqwest client (and thus one cookie jar) per core instance. Network
//! failures are retried with jittered exponential backoff; protocol and
//! server-level errors surface immediately. Server code mapping happens
//! here, including session invalidation on an expiry code.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, instrument, warn};

use crate::config::CoreConfig;
use crate::envelope::{ApiResponse, EnvelopeCodec};
use crate::error::{CoreError, CoreResult};
use crate::retry::ExponentialBackoff;
use crate::session::SessionHolder;

const MAX_ATTEMPTS: u32 = 3;

/// POST wrapper around the envelope protocol.
pub struct SecureTransport {
    http: reqwest::Client,
    config: Arc<CoreConfig>,
    codec: Arc<EnvelopeCodec>,
    sessions: Arc<SessionHolder>,
    backoff: ExponentialBackoff,
}

impl SecureTransport {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(
        config: Arc<CoreConfig>,
        codec: Arc<EnvelopeCodec>,
        sessions: Arc<SessionHolder>,
    ) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            codec,
            sessions,
            backoff: ExponentialBackoff::transport(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        if let Ok(ua) = HeaderValue::from_str(&self.config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// POST a prebuilt wire body and return the parsed outer response.
    /// Does not interpret the server code.
    #[instrument(skip_all, fields(endpoint = endpoint))]
    pub async fn post_raw(
        &self,
        endpoint: &str,
        wire_body: String,
        content_key: &str,
    ) -> CoreResult<ApiResponse> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut attempt = 0u32;
        let text = loop {
            let result = async {
                let resp = self
                    .http
                    .post(&url)
                    .headers(self.headers())
                    .body(wire_body.clone())
                    .send()
                    .await?;
                let status = resp.status();
                let text = resp.text().await?;
                Ok::<_, CoreError>((status, text))
            }
            .await;

            match result {
                Ok((status, text)) => {
                    if !status.is_success() {
                        return Err(CoreError::Protocol {
                            endpoint: endpoint.to_string(),
                            detail: format!("HTTP {status}: {}", truncate(&text, 200)),
                        });
                    }
                    break text;
                }
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = self.backoff.delay(attempt);
                    warn!(endpoint, attempt, ?delay, "network error, retrying: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        self.codec.parse_response(&text, endpoint, content_key)
    }

    /// POST and map the server code: success returns the response, expiry
    /// codes invalidate the session, everything else maps per the taxonomy.
    pub async fn post_checked(
        &self,
        endpoint: &str,
        wire_body: String,
        content_key: &str,
    ) -> CoreResult<ApiResponse> {
        let response = self.post_raw(endpoint, wire_body, content_key).await?;
        if response.code == "0" {
            return Ok(response);
        }
        let err = CoreError::from_server_code(&response.code, &response.message, endpoint);
        if matches!(err, CoreError::SessionExpired { .. }) {
            debug!(endpoint, code = %response.code, "session expired, invalidating");
            self.sessions.invalidate();
        }
        Err(err)
    }

    /// The configured per-request wall timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.config.http_timeout
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
