/// AI assistant endpoints
///
/// # Endpoints
///
/// - `POST /api/assistant/chat` - Prompt the assistant as a member
/// - `GET /api/assistant/greeting` - Personalised introduction for the caller
/// - `POST /api/assistant/guest/chat` - Prompt as a guest (budgeted)
/// - `GET /api/assistant/guest/session` - Remaining guest budget
///
/// Members need an AI-enabled plan in good standing. Guests send an
/// `X-Guest-Session` id; the budget layer in front of the guest chat route
/// has already spent one response by the time the handler runs.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::guest::guest_session_id,
    routes::load_caller,
};
use axum::{extract::State, http::HeaderMap, Extension, Json};
use lynix_shared::{
    assistant::{greeting_prompt, MAX_PROMPT_CHARS},
    auth::{authorization::require_assistant_access, identity::Identity},
    guest::{generate_session_id, GuestSession},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestReplyResponse {
    pub text: String,

    #[serde(flatten)]
    pub session: GuestSession,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSessionResponse {
    /// Set only when the server issued a new session id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(flatten)]
    pub session: GuestSession,
}

/// Returns the prompt with surrounding whitespace removed
fn checked_prompt(prompt: Option<String>) -> ApiResult<String> {
    let prompt = prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("A prompt is required.".to_string()))?;

    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Prompts must be at most {} characters.",
            MAX_PROMPT_CHARS
        )));
    }

    Ok(prompt)
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<ReplyResponse>> {
    let prompt = checked_prompt(req.prompt)?;

    let user = load_caller(&state, &identity).await?;
    require_assistant_access(&user)?;

    let text = state.assistant.reply(&prompt).await?;

    tracing::debug!(user_id = %user.id, prompt_chars = prompt.len(), "Assistant replied");

    Ok(Json(ReplyResponse { text }))
}

pub async fn greeting(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<ReplyResponse>> {
    let user = load_caller(&state, &identity).await?;
    require_assistant_access(&user)?;

    let text = state.assistant.reply(&greeting_prompt(&user.username)).await?;

    Ok(Json(ReplyResponse { text }))
}

pub async fn guest_chat(
    State(state): State<AppState>,
    Extension(session): Extension<GuestSession>,
    Json(req): Json<PromptRequest>,
) -> ApiResult<Json<GuestReplyResponse>> {
    let prompt = checked_prompt(req.prompt)?;

    let text = state.assistant.reply(&prompt).await?;

    tracing::debug!(
        responses_left = session.responses_left,
        "Assistant replied to guest"
    );

    Ok(Json(GuestReplyResponse { text, session }))
}

/// Reports the budget for the session in `X-Guest-Session`, or issues a new
/// session id when the header is absent
pub async fn guest_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<GuestSessionResponse>> {
    let (session_id, issued) = match guest_session_id(&headers) {
        Some(id) => (id, false),
        None => (generate_session_id(), true),
    };

    let session = state.guest_limiter.peek(&session_id).await?;

    if issued {
        tracing::debug!("Issued new guest session");
    }

    Ok(Json(GuestSessionResponse {
        session_id: issued.then_some(session_id),
        session,
    }))
}
