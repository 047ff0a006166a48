//! Typed views over the service's telemetry payloads.
//!
//! Wire payloads are dynamically shaped; each model normalizes one section
//! (aliases, sentinels, numeric strings) into optional typed fields and a
//! field patch for the state store. Enumerated codes outside the known
//! mappings are preserved as raw integers rather than coerced.

use serde_json::Value;

pub mod charging;
pub mod control;
pub mod energy;
pub mod gps;
pub mod hvac;
pub mod realtime;
pub mod token;
pub mod vehicle;

pub use control::{CommandCode, ControlResult, ControlState};
pub use token::AuthToken;
pub use vehicle::{PermissionNode, Vehicle};

/// An enumerated wire code: a known variant, or the raw integer when the
/// value falls outside the documented mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coded<T> {
    Known(T),
    Raw(i64),
}

impl<T: CodedValue> Coded<T> {
    /// The wire integer, regardless of whether the value is known.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Known(v) => v.code(),
            Self::Raw(raw) => raw,
        }
    }

    #[must_use]
    pub fn known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Raw(_) => None,
        }
    }
}

/// Implemented by enums with a fixed wire-integer mapping.
pub trait CodedValue: Copy {
    fn code(self) -> i64;
}

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            #[must_use]
            pub fn from_code(code: i64) -> crate::models::Coded<Self> {
                match code {
                    $($code => crate::models::Coded::Known(Self::$variant),)+
                    other => crate::models::Coded::Raw(other),
                }
            }
        }

        impl crate::models::CodedValue for $name {
            fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }
        }
    };
}
pub(crate) use coded_enum;

/// First value present under any of the listed aliases.
pub(crate) fn field<'a>(obj: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let map = obj.as_object()?;
    aliases.iter().find_map(|k| map.get(*k))
}
