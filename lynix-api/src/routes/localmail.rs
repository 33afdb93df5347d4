/// Local mail endpoints
///
/// Only accounts with `localmail_enabled` may use these.
///
/// # Endpoints
///
/// - `GET /api/localmail/messages?view=inbox|sent` - One side of the mailbox
/// - `GET /api/localmail/messages/:id` - Open a mail (marks it read for the recipient)
/// - `POST /api/localmail/messages` - Send to one or more accounts
///
/// # Compose
///
/// ```json
/// { "recipients": ["demo@lynixity.x10.bz", "darcodr"], "subject": "Hi", "body": "..." }
/// ```
///
/// `recipients` may also be a single comma separated string.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{load_caller, parse_numeric_id},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use lynix_shared::{
    auth::{authorization::require_localmail, identity::Identity},
    models::local_mail::{MailMessage, Mailbox},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct MailboxQuery {
    pub view: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    List(Vec<String>),
    Text(String),
}

impl Recipients {
    /// Every non-blank entry, with comma separated entries split apart
    fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Recipients::List(list) => list.iter().map(String::as_str).collect(),
            Recipients::Text(text) => vec![text.as_str()],
        };

        raw.into_iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMailRequest {
    pub recipients: Option<Recipients>,

    #[validate(length(max = 998, message = "Subject must be at most 998 characters."))]
    pub subject: Option<String>,

    pub body: Option<String>,
}

fn parse_view(view: Option<&str>) -> ApiResult<Mailbox> {
    match view.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(Mailbox::default()),
        Some(view) => Mailbox::parse(view).ok_or_else(|| {
            ApiError::BadRequest("Invalid view. Use \"inbox\" or \"sent\".".to_string())
        }),
    }
}

/// Loads the caller and checks the local mail flag
async fn mail_user(state: &AppState, identity: &Identity) -> ApiResult<()> {
    let user = load_caller(state, identity).await?;
    require_localmail(&user)?;
    Ok(())
}

pub async fn list_mail(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<MailboxQuery>,
) -> ApiResult<Json<Vec<MailMessage>>> {
    let mailbox = parse_view(query.view.as_deref())?;
    mail_user(&state, &identity).await?;

    let mail = MailMessage::list(state.db()?, &identity.user_id, mailbox).await?;
    Ok(Json(mail))
}

pub async fn open_mail(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<MailMessage>> {
    let not_found = || ApiError::NotFound("Message not found.".to_string());

    let id = parse_numeric_id(&raw_id, "Invalid message ID.")?.ok_or_else(not_found)?;
    mail_user(&state, &identity).await?;

    let mail = MailMessage::open(state.db()?, id, &identity.user_id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(mail))
}

pub async fn send_mail(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMailRequest>,
) -> ApiResult<(StatusCode, Json<Vec<MailMessage>>)> {
    let all_required = || ApiError::BadRequest("All fields are required.".to_string());

    let recipients = req.recipients.as_ref().map(Recipients::entries).unwrap_or_default();
    let subject = req.subject.as_deref().map(str::trim).unwrap_or_default();
    let body = req.body.as_deref().unwrap_or_default();

    if recipients.is_empty() || subject.is_empty() || body.trim().is_empty() {
        return Err(all_required());
    }

    req.validate().map_err(ApiError::from_validation)?;
    mail_user(&state, &identity).await?;

    let db = state.db()?;
    let resolved = MailMessage::resolve_recipients(db, &recipients).await?;

    if !resolved.unknown.is_empty() {
        return Err(ApiError::NotFound(format!(
            "Unknown recipients: {}.",
            resolved.unknown.join(", ")
        )));
    }

    let sent = MailMessage::deliver(db, &identity.user_id, &resolved.users, subject, body).await?;

    tracing::info!(
        sender = %identity.user_id,
        recipients = sent.len(),
        "Local mail delivered"
    );

    Ok((StatusCode::CREATED, Json(sent)))
}
