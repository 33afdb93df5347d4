/// Sign-on endpoint
///
/// # Endpoint
///
/// ```text
/// POST /api/auth
/// Content-Type: application/json
///
/// { "username": "DarCodr", "password": "..." }
/// ```
///
/// # Response
///
/// ```json
/// { "user": { "id": "darcodr", "username": "DarCodr", ... }, "token": "eyJ..." }
/// ```
///
/// The username is matched case-insensitively. Unknown users and wrong
/// passwords get the same 401 so the response does not reveal which accounts
/// exist.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::non_blank,
};
use axum::{extract::State, Json};
use lynix_shared::{
    auth::{
        password::{hash_password, needs_rehash, verify_password},
        session::{create_token, SessionClaims},
    },
    models::user::User,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub username: Option<String>,

    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    /// Profile without the password hash
    pub user: User,

    /// Session token for `Authorization: Bearer`
    pub token: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid username or password.".to_string())
}

/// Replaces a legacy hash after the password has been verified
///
/// Failure only costs the upgrade; the sign-on itself goes through.
async fn upgrade_password_hash(db: &PgPool, user_id: &str, password: &str) {
    let hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to rehash legacy password");
            return;
        }
    };

    match User::update_password(db, user_id, &hash).await {
        Ok(_) => tracing::info!(user_id = %user_id, "Legacy password hash upgraded"),
        Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to store upgraded password hash"),
    }
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<SignInResponse>> {
    let username = non_blank(req.username);
    let password = req.password.filter(|p| !p.is_empty());

    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::BadRequest(
            "Username and password are required.".to_string(),
        ));
    };

    let db = state.db()?;

    let Some(user) = User::find_by_username(db, &username).await? else {
        tracing::info!(username = %username, "Sign-on for unknown user");
        return Err(invalid_credentials());
    };

    if !verify_password(&password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Sign-on with wrong password");
        return Err(invalid_credentials());
    }

    if needs_rehash(&user.password_hash) {
        upgrade_password_hash(db, &user.id, &password).await;
    }

    let token = create_token(&SessionClaims::new(&user.id, user.role), state.jwt_secret())?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User signed on");

    Ok(Json(SignInResponse { user, token }))
}
