//! API route handlers.

pub mod admin;
pub mod appointments;
pub mod calendar;
pub mod health;
pub mod slots;
