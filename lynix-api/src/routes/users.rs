/// User management endpoints
///
/// Everything except `/api/users/me` is for administrators.
///
/// # Endpoints
///
/// - `GET /api/users` - List non-admin accounts
/// - `POST /api/users` - Create an account
/// - `PUT /api/users/:id` - Edit profile, plan, billing and feature flags
/// - `PATCH /api/users/:id` - Set a new password
/// - `DELETE /api/users/:id` - Delete a non-admin account
/// - `GET /api/users/me` - The caller's own profile

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{load_caller, non_blank, require_admin_caller},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use lynix_shared::{
    auth::{authorization::require_deletable, identity::Identity, password::hash_password},
    models::user::{Billing, CreateUser, Plan, UpdateUser, User, UserRole},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Profile fields shared by the create and edit forms
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UserFields {
    #[validate(length(max = 255, message = "Username must be at most 255 characters."))]
    pub username: Option<String>,

    #[validate(email(message = "Email address is not valid."))]
    pub email: Option<String>,

    #[serde(default)]
    pub sip: String,

    #[serde(default)]
    pub plan: Plan,

    #[serde(default)]
    pub billing: Billing,

    pub role: Option<UserRole>,

    pub chat_enabled: Option<bool>,

    pub ai_enabled: Option<bool>,

    pub localmail_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub user_data: Option<UserFields>,

    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn missing_fields() -> ApiError {
    ApiError::BadRequest("Missing required fields.".to_string())
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found.".to_string())
}

/// Validates the form and returns the trimmed username and email
fn required_identity(fields: &mut UserFields) -> ApiResult<(String, String)> {
    let username = non_blank(fields.username.take()).ok_or_else(missing_fields)?;
    let email = non_blank(fields.email.take()).ok_or_else(missing_fields)?;

    fields.username = Some(username.clone());
    fields.email = Some(email.clone());
    fields.validate().map_err(ApiError::from_validation)?;

    Ok((username, email))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<User>>> {
    require_admin_caller(&state, &identity).await?;

    let users = User::list_managed(state.db()?).await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    require_admin_caller(&state, &identity).await?;

    let mut fields = req.user_data.ok_or_else(missing_fields)?;
    let password = req.password.filter(|p| !p.is_empty()).ok_or_else(missing_fields)?;
    let (username, email) = required_identity(&mut fields)?;

    let password_hash = hash_password(&password)?;

    let user = User::create(
        state.db()?,
        CreateUser {
            username,
            email,
            password_hash,
            role: fields.role.unwrap_or_default(),
            plan: fields.plan,
            sip: fields.sip,
            billing: fields.billing,
            chat_enabled: fields.chat_enabled.unwrap_or(true),
            ai_enabled: fields.ai_enabled.unwrap_or(true),
            localmail_enabled: fields.localmail_enabled.unwrap_or(true),
        },
    )
    .await?;

    tracing::info!(
        admin = %identity.user_id,
        user_id = %user.id,
        role = user.role.as_str(),
        "User created"
    );

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(mut fields): Json<UserFields>,
) -> ApiResult<Json<User>> {
    require_admin_caller(&state, &identity).await?;

    let (username, email) = required_identity(&mut fields)?;

    let user = User::update(
        state.db()?,
        &id,
        UpdateUser {
            username,
            email,
            sip: fields.sip,
            plan: fields.plan,
            billing: fields.billing,
            chat_enabled: fields.chat_enabled,
            ai_enabled: fields.ai_enabled,
            localmail_enabled: fields.localmail_enabled,
        },
    )
    .await?
    .ok_or_else(user_not_found)?;

    tracing::info!(admin = %identity.user_id, user_id = %user.id, "User updated");

    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    require_admin_caller(&state, &identity).await?;

    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Password is required.".to_string()))?;

    let password_hash = hash_password(&password)?;

    if !User::update_password(state.db()?, &id, &password_hash).await? {
        return Err(user_not_found());
    }

    tracing::info!(admin = %identity.user_id, user_id = %id, "Password changed");

    Ok(Json(MessageResponse {
        message: "Password updated successfully.".to_string(),
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin_caller(&state, &identity).await?;

    let db = state.db()?;
    let target = User::find_by_id(db, &id).await?.ok_or_else(user_not_found)?;
    require_deletable(&target)?;

    // The row can vanish between the lookup and the delete
    if !User::delete(db, &id).await? {
        return Err(user_not_found());
    }

    tracing::info!(admin = %identity.user_id, user_id = %id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<User>> {
    let user = load_caller(&state, &identity).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lynix_shared::models::user::BillingStatus;
    use serde_json::json;

    #[test]
    fn test_create_request_shape() {
        let req: CreateUserRequest = serde_json::from_value(json!({
            "userData": {
                "username": "Demo",
                "email": "demo@lynixity.x10.bz",
                "plan": { "name": "Basic", "cost": "$5", "details": "Starter" },
                "billing": { "status": "Overdue", "owes": 12.5 },
                "ai_enabled": false
            },
            "password": "secret"
        }))
        .unwrap();

        let fields = req.user_data.unwrap();
        assert_eq!(fields.plan.name, "Basic");
        assert_eq!(fields.billing.status, BillingStatus::Overdue);
        assert_eq!(fields.ai_enabled, Some(false));
        assert_eq!(fields.chat_enabled, None);
        assert!(fields.role.is_none());
        assert_eq!(req.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_required_identity() {
        let mut fields = UserFields {
            username: Some("  Demo ".into()),
            email: Some("demo@lynixity.x10.bz".into()),
            ..Default::default()
        };
        let (username, email) = required_identity(&mut fields).unwrap();
        assert_eq!(username, "Demo");
        assert_eq!(email, "demo@lynixity.x10.bz");

        let mut missing = UserFields {
            username: Some("Demo".into()),
            ..Default::default()
        };
        match required_identity(&mut missing) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Missing required fields."),
            other => panic!("unexpected: {:?}", other),
        }

        let mut bad_email = UserFields {
            username: Some("Demo".into()),
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(matches!(
            required_identity(&mut bad_email),
            Err(ApiError::ValidationError(_))
        ));
    }
}
