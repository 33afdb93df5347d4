/// Direct chat endpoints
///
/// # Endpoints
///
/// - `GET /api/chat/users` - Accounts with chat enabled
/// - `GET /api/chat/messages?senderId=&recipientId=` - Open a conversation
/// - `POST /api/chat/messages` - Send a message
/// - `GET /api/chat/alerts` - Unread messages for the bell icon
///
/// `senderId` always names the caller; the client keeps sending it because
/// the conversation view is written from the sender's side.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{load_caller, non_blank},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use lynix_shared::{
    auth::{authorization::require_chat, identity::Identity},
    models::{
        message::{Alert, Message},
        user::{User, UserSummary},
    },
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub sender_id: Option<String>,

    pub recipient_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub sender_id: Option<String>,

    pub recipient_id: Option<String>,

    #[validate(length(max = 4000, message = "Messages must be at most 4000 characters."))]
    pub text: Option<String>,
}

/// Rejects a `senderId` that is not the caller
fn ensure_sender(identity: &Identity, sender_id: &str) -> ApiResult<()> {
    if identity.is(sender_id) {
        Ok(())
    } else {
        tracing::warn!(caller = %identity.user_id, sender_id, "Chat request for another user");
        Err(ApiError::Forbidden(
            "You can only access your own conversations.".to_string(),
        ))
    }
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = User::list_chat_enabled(state.db()?).await?;
    Ok(Json(users))
}

/// Returns both directions oldest first and marks the other side's messages
/// to the caller as read
pub async fn conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let (Some(sender_id), Some(recipient_id)) =
        (non_blank(query.sender_id), non_blank(query.recipient_id))
    else {
        return Err(ApiError::BadRequest(
            "senderId and recipientId are required.".to_string(),
        ));
    };

    ensure_sender(&identity, &sender_id)?;

    let messages = Message::open_conversation(state.db()?, &sender_id, &recipient_id).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    req.validate().map_err(ApiError::from_validation)?;

    let text = req.text.filter(|t| !t.trim().is_empty());
    let (Some(sender_id), Some(recipient_id), Some(text)) =
        (non_blank(req.sender_id), non_blank(req.recipient_id), text)
    else {
        return Err(ApiError::BadRequest(
            "senderId, recipientId, and text are required.".to_string(),
        ));
    };

    ensure_sender(&identity, &sender_id)?;

    let sender = load_caller(&state, &identity).await?;
    require_chat(&sender)?;

    let message = Message::create(state.db()?, &sender_id, &recipient_id, &text).await?;

    tracing::debug!(
        message_id = message.id,
        sender = %message.sender_id,
        recipient = %message.recipient_id,
        "Chat message sent"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn alerts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = Message::unread_alerts(state.db()?, &identity.user_id).await?;
    Ok(Json(alerts))
}
