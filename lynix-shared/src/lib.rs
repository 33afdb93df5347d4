//! # Lynix Shared Library
//!
//! Types and business logic shared by the Lynix API server and the
//! housekeeping worker.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and embedded migrations
//! - `models`: row types and the SQL that reads and writes them
//! - `auth`: password hashing, session tokens, caller identity, access rules
//! - `guest`: response budget for anonymous assistant use
//! - `assistant`: generative-AI client

pub mod assistant;
pub mod auth;
pub mod db;
pub mod guest;
pub mod models;

/// Current version of the Lynix shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
