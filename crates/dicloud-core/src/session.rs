//! Session state and the thread-safe holder shared across the core.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Notify;
use zeroize::Zeroizing;

use dicloud_crypto::digest::md5_hex_upper;

/// An authenticated session. Immutable once created; replaced on re-auth.
pub struct Session {
    pub user_id: String,
    sign_token: Zeroizing<String>,
    /// `MD5(signToken)`, used for request signing.
    pub sign_key: String,
    /// `MD5(encryToken)`, the inner AES key for authenticated calls.
    pub content_key: String,
    created_at: Instant,
}

impl Session {
    /// Derive a session from the token triple returned by login.
    #[must_use]
    pub fn from_tokens(user_id: impl Into<String>, sign_token: &str, encry_token: &str) -> Self {
        Self {
            user_id: user_id.into(),
            sign_token: Zeroizing::new(sign_token.to_string()),
            sign_key: md5_hex_upper(sign_token),
            content_key: md5_hex_upper(encry_token),
            created_at: Instant::now(),
        }
    }

    /// Raw sign token, needed for push-broker credential derivation.
    #[must_use]
    pub fn sign_token(&self) -> &str {
        &self.sign_token
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Holds the current session; all mutation is serialized, readers see a
/// consistent snapshot. Replacement wakes the push listener.
#[derive(Default)]
pub struct SessionHolder {
    current: RwLock<Option<Arc<Session>>>,
    changed: Notify,
}

impl SessionHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, or `None` when unauthenticated / invalidated.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    /// Atomically install a new session.
    pub fn replace(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        *self.current.write() = Some(session.clone());
        self.changed.notify_waiters();
        session
    }

    /// Drop the current session (e.g. after a server-side expiry signal).
    pub fn invalidate(&self) {
        *self.current.write() = None;
        self.changed.notify_waiters();
    }

    /// Wait until the session is replaced or invalidated.
    pub async fn wait_for_change(&self) {
        self.changed.notified().await;
    }
}
