/// Middleware for the API server
///
/// - `security`: security response headers
/// - `identity`: resolves the caller for authenticated routes
/// - `guest`: response budget for anonymous assistant use

pub mod guest;
pub mod identity;
pub mod security;
