//! # Lynix Worker Library
//!
//! Background housekeeping for the Lynix portal.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `sweeper`: periodic expiry of unanswered calls and stale notepads

pub mod config;
pub mod sweeper;
