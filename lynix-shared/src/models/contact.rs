/// Contact model: a per-user address book
///
/// Every query is scoped by `user_id`, so a caller can never read or change
/// another user's contacts; an id owned by someone else behaves exactly like
/// an id that does not exist.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE contacts (
///     id SERIAL PRIMARY KEY,
///     user_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     email VARCHAR(255),
///     phone VARCHAR(64),
///     notes TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Address book entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: i32,

    /// Owning user
    pub user_id: String,

    pub name: String,

    pub email: Option<String>,

    pub phone: Option<String>,

    pub notes: Option<String>,
}

/// Fields accepted when creating or editing a contact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactFields {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl Contact {
    /// Lists the owner's contacts by name
    pub async fn list_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, user_id, name, email, phone, notes
            FROM contacts
            WHERE user_id = $1
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Adds a contact to the owner's address book
    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        fields: ContactFields,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (user_id, name, email, phone, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, name, email, phone, notes
            "#,
        )
        .bind(user_id)
        .bind(fields.name)
        .bind(fields.email)
        .bind(fields.phone)
        .bind(fields.notes)
        .fetch_one(pool)
        .await
    }

    /// Replaces a contact owned by `user_id`
    ///
    /// Returns None when the contact does not exist or belongs to someone else.
    pub async fn update(
        pool: &PgPool,
        id: i32,
        user_id: &str,
        fields: ContactFields,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts
            SET name = $1, email = $2, phone = $3, notes = $4
            WHERE id = $5 AND user_id = $6
            RETURNING id, user_id, name, email, phone, notes
            "#,
        )
        .bind(fields.name)
        .bind(fields.email)
        .bind(fields.phone)
        .bind(fields.notes)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a contact owned by `user_id`
    pub async fn delete(pool: &PgPool, id: i32, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
