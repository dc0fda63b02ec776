//! Domain layer for the asesorías scheduling core.
//!
//! This crate contains:
//! - Domain models (Slot, Appointment, calendar and identity records)
//! - Pure scheduling logic (slot generation, conflicts, state machine,
//!   reconcile decisions)
//! - The calendar gateway seam and its in-memory mock
//! - Domain error types

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{CalendarError, ErrorKind, SchedulingError};
