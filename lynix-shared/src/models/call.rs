/// Call model and the call-signaling state machine
///
/// Softphone signaling is a status column that both participants poll. This
/// module is the single place that decides which status changes are legal.
///
/// # State Machine
///
/// ```text
/// ringing ──answer──> answered ──end──> ended
///    │
///    ├──decline──> declined
///    ├──end──────> ended      (caller hangs up before an answer)
///    └──timeout──> missed     (sweeper only)
/// ```
///
/// Every transition is applied with one conditional UPDATE that names the
/// allowed source statuses, so of two racing updates at most one applies.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE calls (
///     id SERIAL PRIMARY KEY,
///     caller_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     receiver_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     caller_username VARCHAR(255) NOT NULL,
///     receiver_username VARCHAR(255) NOT NULL,
///     status VARCHAR(50) NOT NULL,
///     start_time TIMESTAMPTZ,
///     end_time TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::user::UserSummary;

const CALL_COLUMNS: &str = "id, caller_id, receiver_id, caller_username, receiver_username, \
     status, start_time, end_time, created_at";

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Waiting for the receiver to pick up
    Ringing,

    /// Both parties connected
    Answered,

    /// Hung up by either party
    Ended,

    /// Rejected by the receiver
    Declined,

    /// Never answered before the ring timeout
    Missed,
}

impl CallStatus {
    pub const ALL: [CallStatus; 5] = [
        CallStatus::Ringing,
        CallStatus::Answered,
        CallStatus::Ended,
        CallStatus::Declined,
        CallStatus::Missed,
    ];

    /// Converts status to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Ended => "ended",
            CallStatus::Declined => "declined",
            CallStatus::Missed => "missed",
        }
    }

    /// Parses status from string
    pub fn parse(s: &str) -> Option<Self> {
        CallStatus::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Checks if the call is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Declined | CallStatus::Missed
        )
    }

    /// Whether a participant may request this status over the API
    ///
    /// `ringing` only comes from call creation and `missed` only from the
    /// sweeper.
    pub fn is_client_settable(&self) -> bool {
        matches!(
            self,
            CallStatus::Answered | CallStatus::Ended | CallStatus::Declined
        )
    }

    /// Checks if transition to target status is valid
    pub fn can_transition_to(&self, target: CallStatus) -> bool {
        match (self, target) {
            (CallStatus::Ringing, CallStatus::Answered) => true,
            (CallStatus::Ringing, CallStatus::Declined) => true,
            (CallStatus::Ringing, CallStatus::Ended) => true,
            (CallStatus::Ringing, CallStatus::Missed) => true,

            (CallStatus::Answered, CallStatus::Ended) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }

    /// Statuses from which `target` can be reached
    pub fn sources_for(target: CallStatus) -> Vec<CallStatus> {
        CallStatus::ALL
            .into_iter()
            .filter(|source| source.can_transition_to(target))
            .collect()
    }
}

/// Stored status value that no variant matches
#[derive(Debug, thiserror::Error)]
#[error("Unknown call status: {0}")]
pub struct UnknownCallStatus(pub String);

impl TryFrom<String> for CallStatus {
    type Error = UnknownCallStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CallStatus::parse(&value).ok_or(UnknownCallStatus(value))
    }
}

/// A call between two users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Call {
    pub id: i32,

    pub caller_id: String,

    pub receiver_id: String,

    /// Caller's username at the time of the call
    pub caller_username: String,

    /// Receiver's username at the time of the call
    pub receiver_username: String,

    #[sqlx(try_from = "String")]
    pub status: CallStatus,

    /// When the call was answered
    pub start_time: Option<DateTime<Utc>>,

    /// When the call ended, was declined, or was marked missed
    pub end_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Call {
    /// Whether `user_id` is the caller or the receiver
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.caller_id == user_id || self.receiver_id == user_id
    }
}

/// Result of a requested status change
#[derive(Debug)]
pub enum Transition {
    /// The change was applied
    Applied(Call),

    /// No call with this id has the requester as a participant
    NotFound,

    /// The call exists but its current status does not allow the change
    Rejected { current: CallStatus },
}

impl Call {
    /// Places a new call in the `ringing` state
    pub async fn create(
        pool: &PgPool,
        caller: &UserSummary,
        receiver: &UserSummary,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO calls (caller_id, receiver_id, caller_username, receiver_username, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CALL_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Call>(&query)
            .bind(&caller.id)
            .bind(&receiver.id)
            .bind(&caller.username)
            .bind(&receiver.username)
            .bind(CallStatus::Ringing.as_str())
            .fetch_one(pool)
            .await
    }

    /// Finds a call by id
    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = $1");

        sqlx::query_as::<_, Call>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The call the user should currently see, if any
    ///
    /// Newest `ringing` or `answered` call where the user is caller or
    /// receiver. One query covers incoming, outgoing and connected calls.
    pub async fn find_active_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM calls
            WHERE (receiver_id = $1 OR caller_id = $1)
              AND status IN ('ringing', 'answered')
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        );

        sqlx::query_as::<_, Call>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Moves a call to `target` on behalf of one of its participants
    ///
    /// `answered` stamps `start_time`; every terminal status stamps
    /// `end_time`.
    pub async fn transition(
        pool: &PgPool,
        id: i32,
        participant_id: &str,
        target: CallStatus,
    ) -> Result<Transition, sqlx::Error> {
        let sources: Vec<String> = CallStatus::sources_for(target)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let query = format!(
            r#"
            UPDATE calls
            SET status = $1,
                start_time = CASE WHEN $1 = 'answered' THEN NOW() ELSE start_time END,
                end_time = CASE WHEN $1 IN ('ended', 'declined', 'missed') THEN NOW() ELSE end_time END
            WHERE id = $2
              AND (caller_id = $3 OR receiver_id = $3)
              AND status = ANY($4)
            RETURNING {CALL_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Call>(&query)
            .bind(target.as_str())
            .bind(id)
            .bind(participant_id)
            .bind(&sources)
            .fetch_optional(pool)
            .await?;

        if let Some(call) = updated {
            return Ok(Transition::Applied(call));
        }

        // Nothing matched: tell apart a foreign/missing call from a bad transition
        match Call::find_by_id(pool, id).await? {
            Some(call) if call.has_participant(participant_id) => Ok(Transition::Rejected {
                current: call.status,
            }),
            _ => Ok(Transition::NotFound),
        }
    }

    /// Marks every call still ringing since before `cutoff` as missed
    ///
    /// Returns the calls that were changed.
    pub async fn expire_ringing(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE calls
            SET status = 'missed', end_time = NOW()
            WHERE status = 'ringing' AND created_at < $1
            RETURNING {CALL_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Call>(&query)
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }
}
