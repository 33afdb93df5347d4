/// Guest response budget
///
/// Wraps the anonymous assistant endpoint. One response is spent before the
/// handler runs and given back when the handler does not succeed, so only
/// answered prompts count against the budget. A refund only applies to the
/// window the response was spent in. The remaining budget is
/// reported in `X-Guest-Responses-Left`.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use lynix_shared::guest::{describe_reset, GuestDecision, GUEST_SESSION_HEADER};

/// Response header carrying the remaining budget
pub const RESPONSES_LEFT_HEADER: &str = "x-guest-responses-left";

/// Reads the guest session id from the request
pub fn guest_session_id(req_headers: &axum::http::HeaderMap) -> Option<String> {
    req_headers
        .get(GUEST_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn guest_budget_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = guest_session_id(req.headers()).ok_or_else(|| {
        ApiError::BadRequest(format!("The {} header is required.", GUEST_SESSION_HEADER))
    })?;

    let mut session = match state.guest_limiter.consume(&session_id).await? {
        GuestDecision::Allowed(session) => session,
        GuestDecision::Exhausted {
            session,
            retry_after,
        } => {
            tracing::info!(
                retry_after,
                reset = %describe_reset(session.reset_time),
                "Guest response budget exhausted"
            );
            return Err(ApiError::RateLimitExceeded {
                retry_after,
                message: "You have used all guest responses for now. Sign in with a Lynix ID or try again later."
                    .to_string(),
            });
        }
    };

    req.extensions_mut().insert(session);
    let mut response = next.run(req).await;

    if let (false, Some(window_reset)) = (response.status().is_success(), session.reset_time) {
        match state.guest_limiter.refund(&session_id, window_reset).await {
            Ok(Some(refunded)) => session = refunded,
            Ok(None) => tracing::debug!("Guest window ended before refund"),
            Err(e) => tracing::warn!(error = %e, "Failed to refund guest response"),
        }
    }

    response.headers_mut().insert(
        RESPONSES_LEFT_HEADER,
        HeaderValue::from(session.responses_left),
    );

    Ok(response)
}
