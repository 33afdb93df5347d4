//! # Lynix API Server Library
//!
//! HTTP server for the Lynix portal: sign-on, the admin console, contacts,
//! call signaling, chat, local mail, the notepad and the AI assistant.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from the environment
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Caller identity, guest budget, security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
