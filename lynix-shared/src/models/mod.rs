/// Database models for Lynix
///
/// Each model owns its SQL. Handlers never write queries themselves.
///
/// # Models
///
/// - `user`: accounts, plan and billing, feature flags, notepad
/// - `contact`: per-user address book
/// - `call`: softphone calls and their status machine
/// - `message`: direct chat messages and unread alerts
/// - `local_mail`: internal mail between accounts
///
/// # Example
///
/// ```no_run
/// use lynix_shared::models::user::{User, CreateUser};
/// use lynix_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let new_user = CreateUser {
///     username: "demo".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     email: "demo@lynixity.x10.bz".to_string(),
///     ..Default::default()
/// };
///
/// let user = User::create(&pool, new_user).await?;
/// # Ok(())
/// # }
/// ```

pub mod call;
pub mod contact;
pub mod local_mail;
pub mod message;
pub mod user;
