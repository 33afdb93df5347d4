/// Notepad endpoints
///
/// Each user has one free-text note. A note left unedited for more than
/// 72 hours is cleared the next time it is read; the worker also sweeps
/// expired notes in the background.
///
/// # Endpoints
///
/// - `GET /api/notepad` - `{ "content": "..." }`
/// - `PUT /api/notepad` - Save `{ "content": "..." }`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use lynix_shared::{auth::identity::Identity, models::user::User};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteResponse {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub message: String,
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found.".to_string())
}

pub async fn load_note(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<NoteResponse>> {
    let db = state.db()?;

    let note = User::load_notepad(db, &identity.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    let saved_at = match note.notepad_timestamp {
        Some(saved_at) if note.is_expired(Utc::now()) => saved_at,
        _ => {
            return Ok(Json(NoteResponse {
                content: note.notepad_content,
            }))
        }
    };

    if User::clear_notepad_saved_at(db, &identity.user_id, saved_at).await? {
        tracing::info!(user_id = %identity.user_id, "Expired note cleared");
        return Ok(Json(NoteResponse {
            content: String::new(),
        }));
    }

    // Saved again since it was read; the fresh note wins
    let note = User::load_notepad(db, &identity.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(NoteResponse {
        content: note.notepad_content,
    }))
}

/// Takes the body as raw JSON so a non-string `content` gets the
/// notepad's own 400 message
pub async fn save_note(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<Value>,
) -> ApiResult<Json<SavedResponse>> {
    let content = body
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("A \"content\" string is required.".to_string()))?;

    if !User::save_notepad(state.db()?, &identity.user_id, content).await? {
        return Err(user_not_found());
    }

    tracing::debug!(user_id = %identity.user_id, bytes = content.len(), "Note saved");

    Ok(Json(SavedResponse {
        message: "Note saved successfully.".to_string(),
    }))
}
