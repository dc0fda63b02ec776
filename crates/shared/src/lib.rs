//! Shared utilities for the asesorías scheduling backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Refresh-token sealing and HMAC signing
//! - Civil timezone and wall-clock helpers
//! - Common validation logic
//! - Bearer token verification

pub mod crypto;
pub mod jwt;
pub mod time;
pub mod validation;
