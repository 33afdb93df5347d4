/// Caller identity for authenticated requests
///
/// A request identifies its caller in one of two ways:
///
/// - `Authorization: Bearer <session token>` issued by `POST /api/auth`
/// - `x-user-id: <user id>`, the portal's original placeholder scheme, only
///   honoured when the server enables header identity
///
/// A bearer token always wins when both are present. A malformed or expired
/// token is an error even if an `x-user-id` header is also sent.
///
/// # Example
///
/// ```
/// use axum::http::HeaderMap;
/// use lynix_shared::auth::identity::{resolve_identity, IdentityMethod, USER_ID_HEADER};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(USER_ID_HEADER, "demo".parse().unwrap());
///
/// let identity = resolve_identity(&headers, "unused-secret", true).unwrap().unwrap();
/// assert_eq!(identity.user_id, "demo");
/// assert_eq!(identity.method, IdentityMethod::Header);
/// ```

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::session::{validate_token, SessionClaims, SessionError};

/// Header carrying a plain user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// How the caller was identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMethod {
    /// Signed session token
    Bearer,

    /// Unsigned `x-user-id` header
    Header,
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,

    pub method: IdentityMethod,
}

impl Identity {
    pub fn from_session(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            method: IdentityMethod::Bearer,
        }
    }

    pub fn from_header(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            method: IdentityMethod::Header,
        }
    }

    /// True when `id` names this caller
    pub fn is(&self, id: &str) -> bool {
        self.user_id == id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Authentication required.")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            IdentityError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            _ => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };

        (
            status,
            Json(json!({ "error": code, "message": self.to_string() })),
        )
            .into_response()
    }
}

/// Works out who is calling
///
/// Returns `Ok(None)` when the request carries no credentials at all.
pub fn resolve_identity(
    headers: &HeaderMap,
    secret: &str,
    allow_header_identity: bool,
) -> Result<Option<Identity>, IdentityError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| IdentityError::InvalidFormat("Malformed Authorization header.".to_string()))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IdentityError::InvalidFormat("Expected Bearer token.".to_string()))?;

        let claims = validate_token(token, secret).map_err(|e| match e {
            SessionError::Expired => IdentityError::InvalidToken("Session expired.".to_string()),
            _ => IdentityError::InvalidToken("Invalid session token.".to_string()),
        })?;

        return Ok(Some(Identity::from_session(claims)));
    }

    if allow_header_identity {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(user_id) = user_id {
            return Ok(Some(Identity::from_header(user_id)));
        }
    }

    Ok(None)
}
