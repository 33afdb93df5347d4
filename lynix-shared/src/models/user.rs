/// User model and database operations
///
/// Users are the portal accounts managed from the admin console. The primary
/// key is the lowercased username, so a user's id is also their sign-on name.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id VARCHAR(255) PRIMARY KEY,
///     username VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     role VARCHAR(32) NOT NULL DEFAULT 'standard',
///     plan JSONB NOT NULL,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     sip VARCHAR(255) NOT NULL DEFAULT '',
///     billing JSONB NOT NULL,
///     chat_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     ai_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     localmail_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     notepad_content TEXT NOT NULL DEFAULT '',
///     notepad_timestamp TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use lynix_shared::models::user::{CreateUser, User, UserRole};
/// use lynix_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(
///     &pool,
///     CreateUser {
///         username: "Demo".to_string(),
///         email: "demo@lynixity.x10.bz".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         role: UserRole::Standard,
///         ..Default::default()
///     },
/// )
/// .await?;
/// assert_eq!(user.id, "demo");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

/// Notes untouched for longer than this are cleared.
pub const NOTEPAD_EXPIRATION_HOURS: i64 = 72;

/// Columns returned for every `User` query (never the notepad)
const USER_COLUMNS: &str = "id, username, password_hash, role, plan, email, sip, billing, \
     chat_enabled, ai_enabled, localmail_enabled, created_at";

/// Account role
///
/// Rows written by older deployments use `user` for standard accounts, so
/// that spelling is accepted on the way in and normalised on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full administrative access
    Admin,

    /// Paying account
    #[default]
    #[serde(alias = "user")]
    Standard,

    /// Trial account (no billing or AI portal)
    Trial,

    /// Anonymous or throwaway account
    Guest,
}

impl UserRole {
    /// Converts role to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Standard => "standard",
            UserRole::Trial => "trial",
            UserRole::Guest => "guest",
        }
    }

    /// Parses role from its stored form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "standard" | "user" => Some(UserRole::Standard),
            "trial" => Some(UserRole::Trial),
            "guest" => Some(UserRole::Guest),
            _ => None,
        }
    }
}

/// Stored role value that no variant matches
#[derive(Debug, thiserror::Error)]
#[error("Unknown user role: {0}")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for UserRole {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UserRole::parse(&value).ok_or(UnknownRole(value))
    }
}

/// Subscription plan shown on the profile and admin pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: String,
    #[serde(default)]
    pub details: String,
}

/// Billing standing of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BillingStatus {
    #[default]
    #[serde(rename = "On Time")]
    OnTime,
    #[serde(rename = "Overdue")]
    Overdue,
    #[serde(rename = "Suspended")]
    Suspended,
}

/// Billing record stored as JSONB on the user row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    #[serde(default)]
    pub status: BillingStatus,

    /// Amount owed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owes: Option<f64>,
}

/// User model representing a portal account
///
/// The password hash is loaded for sign-on but never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Lowercased username
    pub id: String,

    /// Display username as entered at creation
    pub username: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    #[sqlx(try_from = "String")]
    pub role: UserRole,

    pub plan: Json<Plan>,

    pub email: String,

    /// SIP address used by the softphone
    pub sip: String,

    pub billing: Json<Billing>,

    pub chat_enabled: bool,

    pub ai_enabled: bool,

    pub localmail_enabled: bool,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this account is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Whether billing has been suspended for non-payment
    pub fn is_suspended(&self) -> bool {
        self.billing.status == BillingStatus::Suspended
    }
}

/// `{id, username}` pair used by the phone and chat directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Username; the id is derived by lowercasing it
    pub username: String,

    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    pub role: UserRole,

    pub plan: Plan,

    pub sip: String,

    pub billing: Billing,

    pub chat_enabled: bool,

    pub ai_enabled: bool,

    pub localmail_enabled: bool,
}

impl Default for CreateUser {
    fn default() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            password_hash: String::new(),
            role: UserRole::Standard,
            plan: Plan::default(),
            sip: String::new(),
            billing: Billing::default(),
            chat_enabled: true,
            ai_enabled: true,
            localmail_enabled: true,
        }
    }
}

/// Input for the admin edit form
///
/// Profile fields are replaced wholesale; feature flags are only changed when
/// present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub username: String,
    pub email: String,
    pub sip: String,
    pub plan: Plan,
    pub billing: Billing,
    pub chat_enabled: Option<bool>,
    pub ai_enabled: Option<bool>,
    pub localmail_enabled: Option<bool>,
}

/// Stored notepad state for one user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notepad {
    pub notepad_content: String,
    pub notepad_timestamp: Option<DateTime<Utc>>,
}

impl Notepad {
    /// Whether the note has gone unedited past the expiration window
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.notepad_timestamp
            .map(|updated| notepad_expired(updated, now))
            .unwrap_or(false)
    }
}

/// Returns true once `now` is strictly past `updated + 72h`
pub fn notepad_expired(updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > updated + Duration::hours(NOTEPAD_EXPIRATION_HOURS)
}

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a database error carrying SQLSTATE `23505` when the username
    /// or email already exists.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (id, username, password_hash, role, plan, email, sip, billing,
                               chat_enabled, ai_enabled, localmail_enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.username.to_lowercase())
            .bind(&data.username)
            .bind(data.password_hash)
            .bind(data.role.as_str())
            .bind(Json(data.plan))
            .bind(data.email)
            .bind(data.sip)
            .bind(Json(data.billing))
            .bind(data.chat_enabled)
            .bind(data.ai_enabled)
            .bind(data.localmail_enabled)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by id
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by username, ignoring case
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(username) = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(username.to_lowercase())
            .fetch_optional(pool)
            .await
    }

    /// Lists every non-admin user for the admin console
    pub async fn list_managed(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role != 'admin' ORDER BY username ASC"
        );

        sqlx::query_as::<_, User>(&query).fetch_all(pool).await
    }

    /// Lists every account as `{id, username}` for the phone directory
    pub async fn list_directory(pool: &PgPool) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>("SELECT id, username FROM users ORDER BY username ASC")
            .fetch_all(pool)
            .await
    }

    /// Lists accounts with chat enabled
    pub async fn list_chat_enabled(pool: &PgPool) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT id, username FROM users WHERE chat_enabled = TRUE ORDER BY username ASC",
        )
        .fetch_all(pool)
        .await
    }

    /// Returns true when at least one admin account exists
    pub async fn admin_exists(pool: &PgPool) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(pool)
            .await
    }

    /// Applies the admin edit form
    ///
    /// Returns None when no user has this id.
    pub async fn update(
        pool: &PgPool,
        id: &str,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET username = $1, email = $2, sip = $3, plan = $4, billing = $5,
                chat_enabled = COALESCE($6, chat_enabled),
                ai_enabled = COALESCE($7, ai_enabled),
                localmail_enabled = COALESCE($8, localmail_enabled)
            WHERE id = $9
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.username)
            .bind(data.email)
            .bind(data.sip)
            .bind(Json(data.plan))
            .bind(Json(data.billing))
            .bind(data.chat_enabled)
            .bind(data.ai_enabled)
            .bind(data.localmail_enabled)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Replaces the password hash. Returns false when no user has this id.
    pub async fn update_password(
        pool: &PgPool,
        id: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user by id
    ///
    /// Contacts, calls, messages and mail cascade with the row.
    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Loads the notepad for a user. None when the user does not exist.
    pub async fn load_notepad(pool: &PgPool, id: &str) -> Result<Option<Notepad>, sqlx::Error> {
        sqlx::query_as::<_, Notepad>(
            "SELECT notepad_content, notepad_timestamp FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Saves the notepad and stamps it with the current time
    pub async fn save_notepad(pool: &PgPool, id: &str, content: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET notepad_content = $1, notepad_timestamp = NOW() WHERE id = $2",
        )
        .bind(content)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Empties one user's notepad if it still carries the save time `saved_at`
    ///
    /// Returns false when the note was saved again (or cleared) since it was
    /// read, leaving the newer note in place.
    pub async fn clear_notepad_saved_at(
        pool: &PgPool,
        id: &str,
        saved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET notepad_content = '', notepad_timestamp = NULL
            WHERE id = $1 AND notepad_timestamp = $2
            "#,
        )
        .bind(id)
        .bind(saved_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Empties every notepad last saved before `cutoff`
    ///
    /// Returns the number of notes cleared.
    pub async fn clear_notepads_saved_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET notepad_content = '', notepad_timestamp = NULL
            WHERE notepad_timestamp IS NOT NULL AND notepad_timestamp < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
