/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and verification
/// - [`session`]: HS256 session tokens issued at sign-on
/// - [`identity`]: resolving the caller from request headers
/// - [`authorization`]: role and feature-flag checks on the loaded user
///
/// # Example
///
/// ```
/// use lynix_shared::auth::password::{hash_password, verify_password};
/// use lynix_shared::auth::session::{create_token, SessionClaims};
/// use lynix_shared::models::user::UserRole;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = SessionClaims::new("demo", UserRole::Standard);
/// let token = create_token(&claims, "a-secret-that-is-at-least-32-bytes-long")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod identity;
pub mod password;
pub mod session;
