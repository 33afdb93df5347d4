/// Local mail: subject/body messages delivered between portal accounts
///
/// Mail never leaves the database. Addresses look like
/// `demo@lynixity.x10.bz`; the local part names a user id and the full
/// address may also match a user's email.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE local_mail (
///     id SERIAL PRIMARY KEY,
///     sender_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     recipient_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     subject VARCHAR(998) NOT NULL,
///     body TEXT NOT NULL,
///     timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     is_read BOOLEAN NOT NULL DEFAULT FALSE
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::user::UserSummary;

const MAIL_SELECT: &str = r#"
    SELECT lm.id, lm.sender_id, lm.recipient_id,
           s.username AS sender_username, r.username AS recipient_username,
           lm.subject, lm.body, lm.timestamp, lm.is_read
    FROM local_mail lm
    JOIN users s ON s.id = lm.sender_id
    JOIN users r ON r.id = lm.recipient_id
"#;

/// Which side of the mailbox to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mailbox {
    #[default]
    Inbox,
    Sent,
}

impl Mailbox {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(Mailbox::Inbox),
            "sent" => Some(Mailbox::Sent),
            _ => None,
        }
    }
}

/// A delivered mail as shown in a mailbox
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MailMessage {
    pub id: i32,
    pub sender_id: String,
    pub recipient_id: String,
    pub sender_username: String,
    pub recipient_username: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// A recipient as typed into the compose form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    /// Text as entered, trimmed
    pub raw: String,

    /// Lowercased part before `@` (or the whole text)
    pub local_part: String,

    /// Lowercased full address when a domain was given
    pub full: Option<String>,
}

impl MailAddress {
    /// Parses one recipient. Blank input and a missing local part yield None.
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return None;
        }

        let lowered = raw.to_lowercase();
        match lowered.split_once('@') {
            Some((local, domain)) => {
                if local.is_empty() || domain.is_empty() {
                    return None;
                }
                Some(Self {
                    raw: raw.to_string(),
                    local_part: local.to_string(),
                    full: Some(lowered.clone()),
                })
            }
            None => Some(Self {
                raw: raw.to_string(),
                local_part: lowered,
                full: None,
            }),
        }
    }
}

/// Outcome of looking up the compose form's recipient list
#[derive(Debug, Default)]
pub struct ResolvedRecipients {
    /// Distinct users, in the order first named
    pub users: Vec<UserSummary>,

    /// Entries that matched no account, as typed
    pub unknown: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct RecipientCandidate {
    id: String,
    username: String,
    email: String,
}

impl MailMessage {
    /// Maps addresses to accounts
    ///
    /// A full-address match on email wins over a local-part match on id.
    pub async fn resolve_recipients(
        pool: &PgPool,
        inputs: &[String],
    ) -> Result<ResolvedRecipients, sqlx::Error> {
        let mut resolved = ResolvedRecipients::default();
        let mut addresses = Vec::new();

        for input in inputs {
            match MailAddress::parse(input) {
                Some(address) => addresses.push(address),
                None if !input.trim().is_empty() => resolved.unknown.push(input.trim().to_string()),
                None => {}
            }
        }

        let locals: Vec<String> = addresses.iter().map(|a| a.local_part.clone()).collect();
        let fulls: Vec<String> = addresses.iter().filter_map(|a| a.full.clone()).collect();

        let candidates = sqlx::query_as::<_, RecipientCandidate>(
            r#"
            SELECT id, username, lower(email) AS email
            FROM users
            WHERE id = ANY($1) OR lower(email) = ANY($2)
            "#,
        )
        .bind(&locals)
        .bind(&fulls)
        .fetch_all(pool)
        .await?;

        for address in addresses {
            let by_email = address
                .full
                .as_ref()
                .and_then(|full| candidates.iter().find(|c| &c.email == full));
            let matched = by_email.or_else(|| candidates.iter().find(|c| c.id == address.local_part));

            match matched {
                Some(candidate) => {
                    if !resolved.users.iter().any(|u| u.id == candidate.id) {
                        resolved.users.push(UserSummary {
                            id: candidate.id.clone(),
                            username: candidate.username.clone(),
                        });
                    }
                }
                None => resolved.unknown.push(address.raw),
            }
        }

        Ok(resolved)
    }

    /// Delivers one copy per recipient inside a single transaction
    pub async fn deliver(
        pool: &PgPool,
        sender_id: &str,
        recipients: &[UserSummary],
        subject: &str,
        body: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut ids: Vec<i32> = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO local_mail (sender_id, recipient_id, subject, body)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(sender_id)
            .bind(&recipient.id)
            .bind(subject)
            .bind(body)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        let query = format!("{MAIL_SELECT} WHERE lm.id = ANY($1) ORDER BY lm.id ASC");
        let delivered = sqlx::query_as::<_, MailMessage>(&query)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(delivered)
    }

    /// Lists one side of a user's mailbox, newest first
    pub async fn list(
        pool: &PgPool,
        user_id: &str,
        mailbox: Mailbox,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let filter = match mailbox {
            Mailbox::Inbox => "lm.recipient_id = $1",
            Mailbox::Sent => "lm.sender_id = $1",
        };
        let query = format!("{MAIL_SELECT} WHERE {filter} ORDER BY lm.timestamp DESC, lm.id DESC");

        sqlx::query_as::<_, MailMessage>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Opens one mail as `viewer_id`
    ///
    /// Returns None unless the viewer sent or received it. Opening as the
    /// recipient marks it read.
    pub async fn open(
        pool: &PgPool,
        id: i32,
        viewer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query =
            format!("{MAIL_SELECT} WHERE lm.id = $1 AND (lm.sender_id = $2 OR lm.recipient_id = $2)");

        let Some(mut mail) = sqlx::query_as::<_, MailMessage>(&query)
            .bind(id)
            .bind(viewer_id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        if mail.recipient_id == viewer_id && !mail.is_read {
            sqlx::query("UPDATE local_mail SET is_read = TRUE WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
            mail.is_read = true;
        }

        Ok(Some(mail))
    }
}
