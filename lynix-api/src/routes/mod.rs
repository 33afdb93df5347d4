/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: service and database status
/// - `auth`: sign-on
/// - `users`: admin console and the caller's own profile
/// - `contacts`: per-user address book
/// - `phone`: call signaling
/// - `chat`: direct messages and unread alerts
/// - `localmail`: subject/body mail between accounts
/// - `notepad`: one note per user, cleared after 72 hours
/// - `assistant`: AI chat for members and budgeted guests

pub mod assistant;
pub mod auth;
pub mod chat;
pub mod contacts;
pub mod health;
pub mod localmail;
pub mod notepad;
pub mod phone;
pub mod users;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use lynix_shared::{
    auth::{authorization::require_admin, identity::Identity},
    models::user::User,
};

/// Parses a path id that must be all ASCII digits
///
/// Returns `Ok(None)` for digit strings too large for a row id; no such row
/// can exist, so callers answer 404.
pub(crate) fn parse_numeric_id(raw: &str, invalid_message: &str) -> ApiResult<Option<i32>> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::BadRequest(invalid_message.to_string()));
    }

    Ok(raw.parse::<i32>().ok())
}

/// Trims a text field and drops it when nothing is left
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loads the account behind the request identity
///
/// A token or header naming a deleted account is treated as no identity.
pub(crate) async fn load_caller(state: &AppState, identity: &Identity) -> ApiResult<User> {
    User::find_by_id(state.db()?, &identity.user_id)
        .await?
        .ok_or_else(|| {
            tracing::debug!(user_id = %identity.user_id, "Identity names no account");
            ApiError::Unauthorized("Authentication required.".to_string())
        })
}

/// Loads the caller and requires the admin role
pub(crate) async fn require_admin_caller(state: &AppState, identity: &Identity) -> ApiResult<User> {
    let caller = load_caller(state, identity).await?;
    require_admin(&caller)?;
    Ok(caller)
}
