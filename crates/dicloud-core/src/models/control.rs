//! Remote command codes and control results.

use serde_json::Value;

use crate::models::{coded_enum, field, Coded};
use crate::normalize;

/// Application-level remote commands and their wire `commandType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Lock,
    Unlock,
    StartClimate,
    StopClimate,
    ScheduleClimate,
    FindCar,
    FlashLights,
    CloseWindows,
    SeatClimate,
    BatteryHeat,
}

impl CommandCode {
    /// The `commandType` string sent on the wire.
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Lock => "LOCKDOOR",
            Self::Unlock => "OPENDOOR",
            Self::StartClimate => "OPENAIR",
            Self::StopClimate => "CLOSEAIR",
            Self::ScheduleClimate => "BOOKINGAIR",
            Self::FindCar => "FINDCAR",
            Self::FlashLights => "FLASHLIGHTNOWHISTLE",
            Self::CloseWindows => "CLOSEWINDOW",
            Self::SeatClimate => "VENTILATIONHEATING",
            Self::BatteryHeat => "BATTERYHEAT",
        }
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire())
    }
}

coded_enum! {
    /// Command execution state reported by trigger/poll/push responses.
    ControlState {
        Pending = 0,
        Success = 1,
        Failure = 2,
    }
}

/// Parsed control response fragment shared by the trigger response, the
/// poll endpoint, and push-delivered results.
#[derive(Debug, Clone)]
pub struct ControlResult {
    pub control_state: Option<Coded<ControlState>>,
    /// Secondary success indicator seen in immediate trigger responses.
    pub res: Option<i64>,
    pub request_serial: Option<String>,
}

impl ControlResult {
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        Self {
            control_state: field(payload, &["controlState"])
                .and_then(normalize::as_i64)
                .map(ControlState::from_code),
            res: field(payload, &["res"]).and_then(normalize::as_i64),
            request_serial: field(payload, &["requestSerial"]).and_then(normalize::as_string),
        }
    }

    /// Either success indicator resolves the command without waiting.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.control_state, Some(Coded::Known(ControlState::Success))) || self.res == Some(2)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.control_state, Some(Coded::Known(ControlState::Failure)))
    }
}

/// How a successful command completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMechanism {
    /// Resolved by the trigger response itself.
    Immediate,
    /// Push-delivered result.
    Mqtt,
    /// HTTP result polling.
    Poll,
}

/// Terminal outcome of a command attempt.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub mechanism: CompletionMechanism,
    pub request_serial: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_mapping_is_complete() {
        assert_eq!(CommandCode::Lock.wire(), "LOCKDOOR");
        assert_eq!(CommandCode::Unlock.wire(), "OPENDOOR");
        assert_eq!(CommandCode::StartClimate.wire(), "OPENAIR");
        assert_eq!(CommandCode::StopClimate.wire(), "CLOSEAIR");
        assert_eq!(CommandCode::ScheduleClimate.wire(), "BOOKINGAIR");
        assert_eq!(CommandCode::FindCar.wire(), "FINDCAR");
        assert_eq!(CommandCode::FlashLights.wire(), "FLASHLIGHTNOWHISTLE");
        assert_eq!(CommandCode::CloseWindows.wire(), "CLOSEWINDOW");
        assert_eq!(CommandCode::SeatClimate.wire(), "VENTILATIONHEATING");
        assert_eq!(CommandCode::BatteryHeat.wire(), "BATTERYHEAT");
    }

    #[test]
    fn success_indicators() {
        assert!(ControlResult::from_value(&json!({"controlState": 1})).is_success());
        assert!(ControlResult::from_value(&json!({"res": 2})).is_success());
        assert!(!ControlResult::from_value(&json!({"controlState": 0})).is_success());
        assert!(ControlResult::from_value(&json!({"controlState": 2})).is_failure());
        assert!(!ControlResult::from_value(&json!({"controlState": "1x"})).is_success());
    }

    #[test]
    fn serial_extraction() {
        let r = ControlResult::from_value(&json!({"controlState": 0, "requestSerial": "X1"}));
        assert_eq!(r.request_serial.as_deref(), Some("X1"));
    }
}
