//! Core client for a proprietary vehicle telematics cloud service.
//!
//! The crate translates application-level read and command calls into the
//! vendor's dual-layer encrypted envelope protocol, ingests asynchronous
//! telemetry from the TLS MQTT push channel, and merges both streams into a
//! deterministic per-vehicle state model that optimistic command updates
//! may temporarily overlay.
//!
//! # Architecture
//!
//! - [`envelope`] / [`transport`] - signed envelope assembly and the HTTP
//!   POST wrapper (one cookie jar per client, retried network errors)
//! - [`session`] - the token-derived session and its holder
//! - push listener - broker discovery, TLS MQTT subscription, double
//!   decryption, and dispatch (internal; started via
//!   [`CoreClient::start_push`])
//! - [`state`] - the per-VIN sectioned store with deterministic merge rules
//!   and optimistic overlays
//! - [`command`] - trigger, push-first/poll-fallback completion racing,
//!   rate-limit retries, and the PIN lockout latch
//! - [`endpoints`] / [`models`] - one adapter and one typed section per
//!   endpoint family
//!
//! # Example
//!
//! ```rust,no_run
//! use dicloud_core::{CommandCode, CoreClient, CoreConfig, Section};
//!
//! # async fn run() -> dicloud_core::CoreResult<()> {
//! let client = CoreClient::new(
//!     CoreConfig::new("user@example.com", "password").with_control_pin("123456"),
//! )?;
//! client.login().await?;
//! client.start_push();
//!
//! let vehicles = client.vehicles().await?;
//! let vin = &vehicles[0].vin;
//! let realtime = client.realtime(vin).await?;
//! println!("soc: {:?}", realtime.elec_percent);
//!
//! client.execute(vin, CommandCode::Lock, None).await?;
//! let section = client.section(vin, Section::Realtime);
//! println!("locks: {:?}", section.get("leftFrontDoorLock"));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod session;
pub mod state;
pub mod time;
pub mod transport;

mod push;

pub use client::CoreClient;
pub use command::{AttemptOutcome, CommandAttempt, OVERLAY_TTL};
pub use config::{CoreConfig, DeviceIdentity};
pub use endpoints::charging::ChargingSchedule;
pub use error::{CoreError, CoreResult};
pub use models::control::{CommandResult, CompletionMechanism};
pub use models::{CommandCode, Vehicle};
pub use session::{Session, SessionHolder};
pub use state::{FieldPatch, Origin, Section, SectionSnapshot, StateEvent, StateStore};
