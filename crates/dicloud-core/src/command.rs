//! Remote command orchestration.
//!
//! A command is a trigger request followed by a race between the
//! push-delivered result and HTTP result polling, bounded by the command
//! deadline and the caller's cancellation token. Successful commands
//! project an optimistic overlay into the state store; telemetry corrects
//! it within the overlay TTL.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use dicloud_crypto::digest::md5_hex_upper;

use crate::client::Core;
use crate::endpoints::control;
use crate::error::{CoreError, CoreResult};
use crate::models::control::{CommandCode, CommandResult, CompletionMechanism, ControlResult};
use crate::models::PermissionNode;
use crate::session::Session;
use crate::state::Section;

/// Overlay lifetime after a successful command.
pub const OVERLAY_TTL: Duration = Duration::from_secs(120);

const RATE_LIMIT_RETRIES: u32 = 3;
const WAITER_CAP: usize = 64;

/// Lifecycle of one command attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    Failure,
    Timeout,
    Cancelled,
}

/// Record of a command attempt, kept for observability.
#[derive(Debug, Clone)]
pub struct CommandAttempt {
    pub vin: String,
    pub command: CommandCode,
    pub request_serial: String,
    pub started_at_ms: i64,
    pub deadline_ms: i64,
    pub outcome: AttemptOutcome,
}

const ATTEMPT_LOG_CAP: usize = 32;

/// Bounded log of recent attempts; outcomes are single-assignment.
#[derive(Default)]
pub(crate) struct AttemptLog {
    entries: Mutex<VecDeque<CommandAttempt>>,
}

impl AttemptLog {
    fn record(&self, attempt: CommandAttempt) {
        let mut entries = self.entries.lock();
        if entries.len() == ATTEMPT_LOG_CAP {
            entries.pop_front();
        }
        entries.push_back(attempt);
    }

    fn finish(&self, serial: &str, outcome: AttemptOutcome) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.request_serial == serial && e.outcome == AttemptOutcome::Pending)
        {
            entry.outcome = outcome;
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<CommandAttempt> {
        self.entries.lock().iter().cloned().collect()
    }
}

/// Single-assignment result cells keyed by request serial. The push
/// listener drains a cell on match; late results for the same serial are
/// discarded. The registry is bounded: the oldest waiter is evicted when
/// full.
#[derive(Default)]
pub(crate) struct Waiters {
    inner: Mutex<WaitersInner>,
}

#[derive(Default)]
struct WaitersInner {
    cells: HashMap<String, oneshot::Sender<ControlResult>>,
    order: VecDeque<String>,
}

impl Waiters {
    pub(crate) fn register(&self, serial: &str) -> oneshot::Receiver<ControlResult> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        while inner.order.len() >= WAITER_CAP {
            if let Some(oldest) = inner.order.pop_front() {
                inner.cells.remove(&oldest);
            }
        }
        inner.order.retain(|s| s != serial);
        inner.order.push_back(serial.to_string());
        inner.cells.insert(serial.to_string(), tx);
        rx
    }

    /// Deliver a result; returns false when no waiter matched (already
    /// resolved, evicted, or never registered).
    pub(crate) fn resolve(&self, serial: &str, result: ControlResult) -> bool {
        let sender = {
            let mut inner = self.inner.lock();
            inner.order.retain(|s| s != serial);
            inner.cells.remove(serial)
        };
        match sender {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    fn unregister(&self, serial: &str) {
        let mut inner = self.inner.lock();
        inner.order.retain(|s| s != serial);
        inner.cells.remove(serial);
    }
}

/// Whether the permission tree grants a command.
///
/// Owners have an empty tree (no restriction). For shared users the tree is
/// consulted two ways: a node carrying the wire command code grants it, and
/// the empirically confirmed rule that battery heating is absent from
/// "Basic control"-only grants.
fn permits(tree: &[PermissionNode], command: CommandCode) -> bool {
    if tree.is_empty() {
        return true;
    }
    if command == CommandCode::BatteryHeat
        && tree.iter().all(|n| n.name.eq_ignore_ascii_case("Basic control"))
    {
        return false;
    }
    // Only enforce code-level gating when the tree actually names commands.
    let names_commands = |node: &PermissionNode| node.matches(command.wire());
    let tree_names_any = tree.iter().any(|n| {
        [
            "LOCKDOOR",
            "OPENDOOR",
            "OPENAIR",
            "CLOSEAIR",
            "BOOKINGAIR",
            "FINDCAR",
            "FLASHLIGHTNOWHISTLE",
            "CLOSEWINDOW",
            "VENTILATIONHEATING",
            "BATTERYHEAT",
        ]
        .iter()
        .any(|code| n.matches(code))
    });
    !tree_names_any || tree.iter().any(names_commands)
}

/// Optimistic fields projected on command success.
fn overlay_fields(
    command: CommandCode,
    params: Option<&Map<String, Value>>,
) -> Option<(Section, BTreeMap<String, Value>)> {
    let lock_keys = [
        "leftFrontDoorLock",
        "rightFrontDoorLock",
        "leftRearDoorLock",
        "rightRearDoorLock",
    ];
    let window_keys = [
        "leftFrontWindow",
        "rightFrontWindow",
        "leftRearWindow",
        "rightRearWindow",
        "skylight",
    ];
    let param = |key: &str| params.and_then(|p| p.get(key)).cloned();

    match command {
        CommandCode::Lock => Some((
            Section::Realtime,
            lock_keys.iter().map(|k| (k.to_string(), Value::from(2))).collect(),
        )),
        CommandCode::Unlock => Some((
            Section::Realtime,
            lock_keys.iter().map(|k| (k.to_string(), Value::from(1))).collect(),
        )),
        CommandCode::CloseWindows => Some((
            Section::Realtime,
            window_keys.iter().map(|k| (k.to_string(), Value::from(1))).collect(),
        )),
        CommandCode::StartClimate => {
            let mut fields = BTreeMap::from([("acSwitch".to_string(), Value::from(1))]);
            if let Some(temp) = param("mainSettingTemp") {
                fields.insert("mainSettingTemp".into(), temp);
            }
            Some((Section::Hvac, fields))
        }
        CommandCode::StopClimate => Some((
            Section::Hvac,
            BTreeMap::from([("acSwitch".to_string(), Value::from(0))]),
        )),
        CommandCode::SeatClimate => {
            let mapping = [
                ("mainHeat", "mainSeatHeatState"),
                ("mainVentilation", "mainSeatVentilationState"),
                ("copilotHeat", "copilotSeatHeatState"),
                ("copilotVentilation", "copilotSeatVentilationState"),
            ];
            let fields: BTreeMap<String, Value> = mapping
                .iter()
                .filter_map(|(from, to)| param(from).map(|v| (to.to_string(), v)))
                .collect();
            (!fields.is_empty()).then_some((Section::Realtime, fields))
        }
        CommandCode::BatteryHeat => {
            let on = match param("batteryHeatSwitch") {
                Some(Value::Bool(b)) => i64::from(b),
                Some(Value::Number(n)) => i64::from(n.as_i64() == Some(1)),
                _ => 1,
            };
            Some((
                Section::Realtime,
                BTreeMap::from([("batteryHeatState".to_string(), Value::from(on))]),
            ))
        }
        CommandCode::FindCar | CommandCode::FlashLights | CommandCode::ScheduleClimate => None,
    }
}

fn apply_overlay(core: &Core, vin: &str, command: CommandCode, params: Option<&Map<String, Value>>) {
    if let Some((section, fields)) = overlay_fields(command, params) {
        core.store.overlay(vin, section, fields, OVERLAY_TTL);
    }
}

/// Trigger with bounded retries on the rate-limit code.
async fn trigger_with_retry(
    core: &Core,
    session: &Session,
    vin: &str,
    command: CommandCode,
    params: Option<&Map<String, Value>>,
    command_pwd: &str,
) -> CoreResult<ControlResult> {
    let backoff = crate::retry::ExponentialBackoff::rate_limit();
    let mut attempt = 0u32;
    loop {
        match control::trigger(core, session, vin, command, params, command_pwd).await {
            Err(CoreError::RateLimited { endpoint }) => {
                if attempt >= RATE_LIMIT_RETRIES {
                    return Err(CoreError::EndpointNotSupported {
                        endpoint,
                        detail: "persistent rate limiting".into(),
                    });
                }
                let delay = backoff.delay(attempt);
                warn!(vin, %command, attempt, ?delay, "rate limited, backing off");
                sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Execute a remote command end to end.
#[instrument(skip_all, fields(vin = vin, command = %command))]
pub(crate) async fn execute(
    core: &Arc<Core>,
    session: &Session,
    vin: &str,
    command: CommandCode,
    params: Option<&Map<String, Value>>,
    cancel: &CancellationToken,
) -> CoreResult<CommandResult> {
    if core.pin_locked.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(CoreError::ControlPasswordLocked);
    }
    if let Some(tree) = core.permissions.lock().get(vin) {
        if !permits(tree, command) {
            return Err(CoreError::EndpointNotSupported {
                endpoint: crate::endpoints::REMOTE_CONTROL.into(),
                detail: format!("{command} not granted for this vehicle"),
            });
        }
    }
    let pin = core
        .config
        .control_pin
        .as_deref()
        .ok_or(CoreError::ControlPinMissing)?;
    let command_pwd = md5_hex_upper(pin);

    let triggered = trigger_with_retry(core, session, vin, command, params, &command_pwd)
        .await
        .map_err(|err| {
            if matches!(
                err,
                CoreError::ControlPasswordWrong | CoreError::ControlPasswordLocked
            ) {
                core.pin_locked.store(true, std::sync::atomic::Ordering::SeqCst);
            }
            err
        })?;

    if triggered.is_success() {
        apply_overlay(core, vin, command, params);
        return Ok(CommandResult {
            mechanism: CompletionMechanism::Immediate,
            request_serial: triggered.request_serial,
        });
    }
    if triggered.is_failure() {
        return Err(CoreError::RemoteControlFailure);
    }

    let serial = triggered
        .request_serial
        .clone()
        .ok_or_else(|| CoreError::Protocol {
            endpoint: crate::endpoints::REMOTE_CONTROL.into(),
            detail: "trigger response carries neither result nor requestSerial".into(),
        })?;

    let started = crate::time::now_ms();
    let deadline_ms = started
        + core.config.mqtt_timeout.as_millis() as i64
        + (core.config.poll_attempts as i64) * core.config.poll_interval.as_millis() as i64;
    core.attempts.record(CommandAttempt {
        vin: vin.to_string(),
        command,
        request_serial: serial.clone(),
        started_at_ms: started,
        deadline_ms,
        outcome: AttemptOutcome::Pending,
    });

    let mut waiter = core.waiters.register(&serial);
    let raced = tokio::select! {
        _ = cancel.cancelled() => RaceEnd::Cancelled,
        pushed = &mut waiter => match pushed {
            Ok(result) => RaceEnd::Resolved(result, CompletionMechanism::Mqtt),
            // Waiter evicted from a full registry; fall through to polling.
            Err(_) => poll_phase(core, session, vin, command, &serial, cancel, Duration::ZERO).await,
        },
        polled = poll_phase(core, session, vin, command, &serial, cancel, core.config.mqtt_timeout) => polled,
    };
    core.waiters.unregister(&serial);

    match raced {
        RaceEnd::Resolved(result, mechanism) => {
            if result.is_success() {
                core.attempts.finish(&serial, AttemptOutcome::Success);
                apply_overlay(core, vin, command, params);
                Ok(CommandResult {
                    mechanism,
                    request_serial: Some(serial),
                })
            } else {
                core.attempts.finish(&serial, AttemptOutcome::Failure);
                Err(CoreError::RemoteControlFailure)
            }
        }
        RaceEnd::Cancelled => {
            core.attempts.finish(&serial, AttemptOutcome::Cancelled);
            Err(CoreError::Cancelled)
        }
        RaceEnd::Exhausted => {
            core.attempts.finish(&serial, AttemptOutcome::Timeout);
            Err(CoreError::Timeout {
                what: format!("command {command} on {vin}"),
            })
        }
        RaceEnd::Failed(err) => Err(err),
    }
}

enum RaceEnd {
    Resolved(ControlResult, CompletionMechanism),
    Cancelled,
    Exhausted,
    Failed(CoreError),
}

/// HTTP polling fallback, entered after the push wait times out.
async fn poll_phase(
    core: &Core,
    session: &Session,
    vin: &str,
    command: CommandCode,
    serial: &str,
    cancel: &CancellationToken,
    initial_wait: Duration,
) -> RaceEnd {
    tokio::select! {
        _ = cancel.cancelled() => return RaceEnd::Cancelled,
        () = sleep(initial_wait) => {}
    }
    for attempt in 1..=core.config.poll_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return RaceEnd::Cancelled,
            () = sleep(core.config.poll_interval) => {}
        }
        match control::poll_result(core, session, vin, command, serial).await {
            Ok(result) if result.is_success() || result.is_failure() => {
                return RaceEnd::Resolved(result, CompletionMechanism::Poll);
            }
            Ok(_) => {}
            Err(CoreError::Api { code, .. }) => {
                debug!(vin, %command, attempt, %code, "result poll attempt failed");
            }
            Err(err) => return RaceEnd::Failed(err),
        }
    }
    RaceEnd::Exhausted
}
