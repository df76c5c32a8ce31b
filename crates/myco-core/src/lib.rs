//! Platform-independent core library for the myco grow-room client
//!
//! This crate mirrors live environmental telemetry (temperature, humidity,
//! CO₂) and actuator state from a push-based hierarchical remote store. It
//! owns the bounded per-channel time series, reconciles the one-shot history
//! snapshot with the live update stream, persists and prunes the remote
//! history on a timer, derives threshold alerts and gates every actuator and
//! configuration write behind the admin session and the auto/manual mode.
//!
//! It is `#![no_std]` with `extern crate alloc` so it runs inside any
//! single-threaded cooperative executor. The remote store and the identity
//! provider are reached only through the [`store::RemoteStore`] and
//! [`control::IdentityProvider`] traits.

#![no_std]

extern crate alloc;

pub mod alerts;
pub mod app_state;
pub mod config;
pub mod control;
pub mod sensors;
pub mod storage;
pub mod store;
pub mod sync;
pub mod validation;

/// Milliseconds since the Unix epoch.
///
/// The core never reads a clock; every operation that needs "now" takes it
/// as an argument.
pub type Timestamp = u64;

pub use app_state::{AppError, Engine, EngineEvent, EngineRunState};
pub use config::Config;
