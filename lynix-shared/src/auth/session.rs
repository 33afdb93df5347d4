/// Session tokens issued at sign-on
///
/// Tokens are HS256 JWTs signed with the server's `JWT_SECRET`. The subject
/// is the user id; the role is carried for logging only and is always
/// re-read from the database before an admin decision.
///
/// # Example
///
/// ```
/// use lynix_shared::auth::session::{create_token, validate_token, SessionClaims};
/// use lynix_shared::models::user::UserRole;
///
/// let secret = "a-secret-that-is-at-least-32-bytes-long";
/// let claims = SessionClaims::new("demo", UserRole::Standard);
/// let token = create_token(&claims, secret).unwrap();
///
/// let validated = validate_token(&token, secret).unwrap();
/// assert_eq!(validated.sub, "demo");
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::user::UserRole;

/// Issuer claim on every session token
pub const ISSUER: &str = "lynix";

/// How long a session token stays valid
pub fn session_lifetime() -> Duration {
    Duration::hours(12)
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token issuer")]
    InvalidIssuer,
}

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,

    /// Role at sign-on time
    pub role: UserRole,

    pub iss: String,

    pub iat: i64,

    pub exp: i64,

    pub nbf: i64,
}

impl SessionClaims {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self::with_expiration(user_id, role, session_lifetime())
    }

    pub fn with_expiration(user_id: impl Into<String>, role: UserRole, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.into(),
            role,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims into a compact JWT
pub fn create_token(claims: &SessionClaims, secret: &str) -> Result<String, SessionError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| SessionError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, issuer, `exp` and `nbf`
pub fn validate_token(token: &str, secret: &str) -> Result<SessionClaims, SessionError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => SessionError::InvalidIssuer,
        _ => SessionError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
