//! The core client instance: owned session, cookie jar, state store, push
//! listener, and command orchestration behind a method-per-operation API.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::command::{self, AttemptLog, CommandAttempt, Waiters};
use crate::config::CoreConfig;
use crate::endpoints;
use crate::endpoints::charging::ChargingSchedule;
use crate::envelope::EnvelopeCodec;
use crate::error::{CoreError, CoreResult};
use crate::models::charging::ChargingStatus;
use crate::models::energy::EnergyConsumption;
use crate::models::gps::GpsInfo;
use crate::models::hvac::HvacStatus;
use crate::models::realtime::RealtimeStatus;
use crate::models::{CommandCode, PermissionNode, Vehicle};
use crate::push;
use crate::session::{Session, SessionHolder};
use crate::state::{Section, SectionSnapshot, StateStore};
use crate::transport::SecureTransport;

/// Shared internals handed to endpoint adapters, the push listener, and the
/// command orchestrator.
pub(crate) struct Core {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) codec: Arc<EnvelopeCodec>,
    pub(crate) transport: SecureTransport,
    pub(crate) sessions: Arc<SessionHolder>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) waiters: Waiters,
    pub(crate) attempts: AttemptLog,
    pub(crate) permissions: Mutex<HashMap<String, Vec<PermissionNode>>>,
    /// Armed after a PIN-wrong/PIN-locked response; commands short-circuit
    /// locally from then on.
    pub(crate) pin_locked: AtomicBool,
    login_gate: tokio::sync::Mutex<()>,
}

struct PushHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Client for the vehicle telematics cloud.
pub struct CoreClient {
    core: Arc<Core>,
    push: Mutex<Option<PushHandle>>,
}

impl CoreClient {
    /// Build a client instance. No network traffic happens here.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client or the embedded cipher tables cannot be
    /// initialized.
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        let config = Arc::new(config);
        let codec = Arc::new(EnvelopeCodec::new(config.clone())?);
        let sessions = Arc::new(SessionHolder::new());
        let transport = SecureTransport::new(config.clone(), codec.clone(), sessions.clone())?;
        Ok(Self {
            core: Arc::new(Core {
                config,
                codec,
                transport,
                sessions,
                store: Arc::new(StateStore::new()),
                waiters: Waiters::default(),
                attempts: AttemptLog::default(),
                permissions: Mutex::new(HashMap::new()),
                pin_locked: AtomicBool::new(false),
                login_gate: tokio::sync::Mutex::new(()),
            }),
            push: Mutex::new(None),
        })
    }

    /// Authenticate with the configured credentials, replacing any current
    /// session.
    ///
    /// # Errors
    ///
    /// Surfaces transport, protocol, and server-side login failures.
    pub async fn login(&self) -> CoreResult<()> {
        self.login_internal().await.map(|_| ())
    }

    async fn login_internal(&self) -> CoreResult<Arc<Session>> {
        let _guard = self.core.login_gate.lock().await;
        let session = endpoints::login::login(&self.core).await?;
        Ok(self.core.sessions.replace(session))
    }

    /// Current valid session, logging in if absent or past its TTL.
    ///
    /// # Errors
    ///
    /// Fails when re-authentication fails.
    pub async fn ensure_session(&self) -> CoreResult<Arc<Session>> {
        if let Some(session) = self.core.sessions.current() {
            if !session.is_expired(self.core.config.session_ttl) {
                return Ok(session);
            }
            debug!("session past ttl, re-authenticating");
            self.core.sessions.invalidate();
        }
        self.login_internal().await
    }

    /// Run an authenticated operation; on a server-side session expiry,
    /// re-authenticate once and retry once.
    async fn with_reauth<T, F, Fut>(&self, op: F) -> CoreResult<T>
    where
        F: Fn(Arc<Session>) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let session = self.ensure_session().await?;
        match op(session).await {
            Err(CoreError::SessionExpired { .. }) => {
                let session = self.login_internal().await?;
                op(session).await
            }
            other => other,
        }
    }

    /// Vehicles bound to the account. Also refreshes the permission trees
    /// consulted by [`execute`](Self::execute).
    pub async fn vehicles(&self) -> CoreResult<Vec<Vehicle>> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            async move { endpoints::vehicles::fetch_vehicles(&core, &session).await }
        })
        .await
    }

    /// Realtime telemetry (trigger + poll until the vehicle reports).
    pub async fn realtime(&self, vin: &str) -> CoreResult<RealtimeStatus> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move { endpoints::realtime::poll_realtime(&core, &session, &vin).await }
        })
        .await
    }

    /// Vehicle location (trigger + poll).
    pub async fn gps(&self, vin: &str) -> CoreResult<GpsInfo> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move { endpoints::gps::poll_gps(&core, &session, &vin).await }
        })
        .await
    }

    /// Climate status snapshot.
    pub async fn hvac_status(&self, vin: &str) -> CoreResult<HvacStatus> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move { endpoints::hvac::fetch_hvac(&core, &session, &vin).await }
        })
        .await
    }

    /// Smart-charging home page snapshot.
    pub async fn charging_status(&self, vin: &str) -> CoreResult<ChargingStatus> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move { endpoints::charging::fetch_charging(&core, &session, &vin).await }
        })
        .await
    }

    /// Energy consumption report.
    pub async fn energy_consumption(&self, vin: &str) -> CoreResult<EnergyConsumption> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move { endpoints::energy::fetch_energy(&core, &session, &vin).await }
        })
        .await
    }

    /// Verify a control PIN (the configured one by default).
    ///
    /// # Errors
    ///
    /// `ControlPinMissing` when neither an explicit nor a configured PIN is
    /// available.
    pub async fn verify_control_password(&self, vin: &str, pin: Option<&str>) -> CoreResult<()> {
        let pin = pin
            .map(str::to_string)
            .or_else(|| self.core.config.control_pin.clone())
            .ok_or(CoreError::ControlPinMissing)?;
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            let pin = pin.clone();
            async move {
                endpoints::control::verify_control_password(&core, &session, &vin, &pin).await
            }
        })
        .await
    }

    /// Toggle smart charging.
    pub async fn set_smart_charging(&self, vin: &str, enable: bool) -> CoreResult<()> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move {
                endpoints::charging::set_smart_charging(&core, &session, &vin, enable).await
            }
        })
        .await
    }

    /// Save or update the smart-charging schedule.
    pub async fn save_charging_schedule(
        &self,
        vin: &str,
        schedule: ChargingSchedule,
    ) -> CoreResult<()> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            async move {
                endpoints::charging::save_charging_schedule(&core, &session, &vin, schedule).await
            }
        })
        .await
    }

    /// Execute a remote command and wait for its terminal outcome.
    pub async fn execute(
        &self,
        vin: &str,
        command: CommandCode,
        params: Option<Map<String, Value>>,
    ) -> CoreResult<crate::models::control::CommandResult> {
        self.execute_with_cancel(vin, command, params, &CancellationToken::new())
            .await
    }

    /// Execute a remote command under an external cancellation token.
    #[instrument(skip_all, fields(vin = vin, command = %command))]
    pub async fn execute_with_cancel(
        &self,
        vin: &str,
        command: CommandCode,
        params: Option<Map<String, Value>>,
        cancel: &CancellationToken,
    ) -> CoreResult<crate::models::control::CommandResult> {
        self.with_reauth(|session| {
            let core = self.core.clone();
            let vin = vin.to_string();
            let params = params.clone();
            let cancel = cancel.clone();
            async move {
                command::execute(&core, &session, &vin, command, params.as_ref(), &cancel).await
            }
        })
        .await
    }

    /// Start the push listener (no-op when MQTT is disabled or already
    /// running). The listener parks until a session exists.
    pub fn start_push(&self) {
        if !self.core.config.mqtt_enabled {
            debug!("mqtt disabled, push listener not started");
            return;
        }
        let mut push = self.push.lock();
        if push.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let task = push::spawn(self.core.clone(), cancel.clone());
        *push = Some(PushHandle { cancel, task });
    }

    /// Stop the push listener and wait for it to wind down.
    pub async fn shutdown(&self) {
        let handle = self.push.lock().take();
        if let Some(PushHandle { cancel, task }) = handle {
            cancel.cancel();
            let _ = task.await;
        }
    }

    /// Merged view of one state section.
    #[must_use]
    pub fn section(&self, vin: &str, section: Section) -> SectionSnapshot {
        self.core.store.section(vin, section)
    }

    /// The state store (read access for embedding applications).
    #[must_use]
    pub fn store(&self) -> Arc<StateStore> {
        self.core.store.clone()
    }

    /// Recent command attempts with their outcomes.
    #[must_use]
    pub fn recent_attempts(&self) -> Vec<CommandAttempt> {
        self.core.attempts.snapshot()
    }

    /// Whether commands are locally short-circuited after a PIN failure.
    #[must_use]
    pub fn is_control_locked(&self) -> bool {
        self.core.pin_locked.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreClient")
            .field("base_url", &self.core.config.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use dicloud_crypto::digest::md5_hex_upper;
    use dicloud_crypto::{aes, WhiteBoxCodec};

    use super::*;
    use crate::models::control::CompletionMechanism;

    fn wire(outer: Value) -> String {
        let codec = WhiteBoxCodec::new().unwrap();
        let encoded = codec.encode_envelope(outer.to_string().as_bytes());
        json!({ "response": encoded }).to_string()
    }

    fn wire_ok(payload: &Value, key: &str) -> String {
        let encrypted = aes::encrypt_hex(&payload.to_string(), key).unwrap();
        wire(json!({"code": "0", "message": "success", "respondData": encrypted}))
    }

    async fn mount_login(server: &MockServer) {
        let body = wire_ok(
            &json!({"token": {"userId": "1434", "signToken": "S", "encryToken": "E"}}),
            &md5_hex_upper("p"),
        );
        Mock::given(method("POST"))
            .and(path("/app/account/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    /// A pending trigger followed by a push-delivered result must resolve
    /// through the waiter, ahead of any HTTP polling.
    #[tokio::test]
    async fn command_resolves_via_push_fast_path() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let key = md5_hex_upper("E");
        Mock::given(method("POST"))
            .and(path("/control/remoteControl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
                &json!({"controlState": 0, "requestSerial": "X1"}),
                &key,
            )))
            .mount(&server)
            .await;

        let config = CoreConfig::new("u@x", "p")
            .with_base_url(server.uri())
            .with_control_pin("123456")
            .with_mqtt_enabled(false)
            // Long enough that only the push path can win.
            .with_mqtt_timeout(Duration::from_secs(30))
            .with_polling(1, Duration::from_secs(30));
        let client = Arc::new(CoreClient::new(config).unwrap());
        client.login().await.unwrap();

        let runner = client.clone();
        let task = tokio::spawn(async move {
            runner.execute("VIN1", CommandCode::Lock, None).await
        });

        // Feed the push message through the full decode pipeline once the
        // waiter is registered.
        let wbox = WhiteBoxCodec::new().unwrap();
        let inner = aes::encrypt_hex("{\"requestSerial\":\"X1\",\"controlState\":1}", &key).unwrap();
        let push_body = wbox.encode_envelope(
            json!({"event": "remoteControl", "vin": "VIN1", "data": {"respondData": inner}})
                .to_string()
                .as_bytes(),
        );
        let envelope =
            crate::push::decode_message(&wbox, &key, push_body.as_bytes()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            crate::push::dispatch(&client.core, &envelope);
            if client
                .recent_attempts()
                .iter()
                .any(|a| a.outcome != crate::command::AttemptOutcome::Pending)
            {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "push result never consumed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.mechanism, CompletionMechanism::Mqtt);
        assert_eq!(result.request_serial.as_deref(), Some("X1"));

        // The overlay from the push-resolved success is visible.
        let section = client.section("VIN1", Section::Realtime);
        assert_eq!(section.get("leftFrontDoorLock"), Some(&serde_json::json!(2)));
    }

    /// Cancellation resolves the attempt as cancelled without rolling back
    /// anything already applied.
    #[tokio::test]
    async fn command_honours_cancellation() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let key = md5_hex_upper("E");
        Mock::given(method("POST"))
            .and(path("/control/remoteControl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
                &json!({"controlState": 0, "requestSerial": "X9"}),
                &key,
            )))
            .mount(&server)
            .await;

        let config = CoreConfig::new("u@x", "p")
            .with_base_url(server.uri())
            .with_control_pin("123456")
            .with_mqtt_enabled(false)
            .with_mqtt_timeout(Duration::from_secs(30))
            .with_polling(1, Duration::from_secs(30));
        let client = Arc::new(CoreClient::new(config).unwrap());
        client.login().await.unwrap();

        let cancel = CancellationToken::new();
        let runner = client.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            runner
                .execute_with_cancel("VIN1", CommandCode::Lock, None, &token)
                .await
        });

        // Wait for the attempt to register, then cancel.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while client.recent_attempts().is_empty() {
            assert!(std::time::Instant::now() < deadline, "attempt never registered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(
            client.recent_attempts()[0].outcome,
            crate::command::AttemptOutcome::Cancelled
        );
    }
}
