/// Guest access to the AI assistant
///
/// Visitors without an account may ask the assistant a few questions. Each
/// guest session gets a fixed response budget that refills after a
/// wall-clock window, measured from the first response in that window.
///
/// ```text
/// first use            window elapses
///     │  5 → 4 → ... → 0   │  budget back to 5
///     ▼                    ▼
/// ────●────────────────────●──────────────
///     started              reset_time
/// ```
///
/// The counter lives on the server, keyed by a SHA-256 hash of the session
/// id, in memory or in Redis. Both backends implement [`GuestLimiter`].
///
/// # Example
///
/// ```
/// use lynix_shared::guest::{GuestLimiter, GuestPolicy, MemoryGuestLimiter};
///
/// # async fn example() -> Result<(), lynix_shared::guest::GuestLimitError> {
/// let limiter = MemoryGuestLimiter::new(GuestPolicy::default());
/// let session = limiter.consume("guest-session-0001").await?;
/// assert!(session.is_allowed());
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Header carrying the guest session id
pub const GUEST_SESSION_HEADER: &str = "x-guest-session";

/// Length of generated session ids
const SESSION_ID_LENGTH: usize = 32;

/// Accepted length range for client-supplied session ids
const SESSION_ID_MIN: usize = 8;
const SESSION_ID_MAX: usize = 128;

/// Entries kept in memory before expired windows are swept
const MEMORY_SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum GuestLimitError {
    #[error("Invalid guest session id.")]
    InvalidSession,

    #[error("Guest limiter backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for GuestLimitError {
    fn from(err: redis::RedisError) -> Self {
        GuestLimitError::Backend(err.to_string())
    }
}

/// Budget and window for guest sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestPolicy {
    pub response_limit: u32,

    pub window: Duration,
}

impl Default for GuestPolicy {
    fn default() -> Self {
        Self {
            response_limit: 5,
            window: Duration::from_secs(3600),
        }
    }
}

impl GuestPolicy {
    fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// What a guest session has left, as shown to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSession {
    pub responses_left: u32,

    /// When the budget refills, in epoch milliseconds; None before first use
    pub reset_time: Option<i64>,
}

/// Outcome of spending one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestDecision {
    Allowed(GuestSession),

    Exhausted {
        session: GuestSession,
        /// Whole seconds until the budget refills
        retry_after: u64,
    },
}

impl GuestDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuestDecision::Allowed(_))
    }

    pub fn session(&self) -> GuestSession {
        match self {
            GuestDecision::Allowed(session) => *session,
            GuestDecision::Exhausted { session, .. } => *session,
        }
    }
}

/// Per-session response counter
#[async_trait]
pub trait GuestLimiter: Send + Sync {
    /// Current budget without spending anything
    async fn peek(&self, session_id: &str) -> Result<GuestSession, GuestLimitError>;

    /// Spends one response if any are left
    async fn consume(&self, session_id: &str) -> Result<GuestDecision, GuestLimitError>;

    /// Gives back a response spent on a request that then failed
    ///
    /// `window_reset` is the `reset_time` returned when the response was
    /// spent. Nothing is given back once that window has ended, so a refund
    /// never lands in a later window. Returns the updated budget when the
    /// response was given back.
    async fn refund(
        &self,
        session_id: &str,
        window_reset: i64,
    ) -> Result<Option<GuestSession>, GuestLimitError>;
}

/// Creates a new random guest session id (base62)
pub fn generate_session_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..SESSION_ID_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Checks a client-supplied session id
///
/// 8 to 128 characters from `[A-Za-z0-9_-]`.
pub fn validate_session_id(session_id: &str) -> Result<(), GuestLimitError> {
    let len = session_id.len();
    let charset_ok = session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if (SESSION_ID_MIN..=SESSION_ID_MAX).contains(&len) && charset_ok {
        Ok(())
    } else {
        Err(GuestLimitError::InvalidSession)
    }
}

/// Hex SHA-256 of a session id, used as the storage key
pub fn hash_session_id(session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Seconds from `now_ms` until `reset_ms`, rounded up
fn seconds_until(reset_ms: i64, now_ms: i64) -> u64 {
    let remaining = (reset_ms - now_ms).max(0) as u64;
    remaining.div_ceil(1000)
}

/// Counter state for one session
#[derive(Debug, Clone, Copy)]
struct GuestWindow {
    used: u32,
    started_ms: i64,
}

impl GuestWindow {
    fn reset_ms(&self, policy: &GuestPolicy) -> i64 {
        self.started_ms + policy.window_ms()
    }

    fn is_expired(&self, policy: &GuestPolicy, now_ms: i64) -> bool {
        now_ms >= self.reset_ms(policy)
    }

    fn session(&self, policy: &GuestPolicy) -> GuestSession {
        GuestSession {
            responses_left: policy.response_limit.saturating_sub(self.used),
            reset_time: Some(self.reset_ms(policy)),
        }
    }
}

/// In-process limiter; counters are lost on restart
pub struct MemoryGuestLimiter {
    policy: GuestPolicy,
    windows: Mutex<HashMap<String, GuestWindow>>,
}

impl MemoryGuestLimiter {
    pub fn new(policy: GuestPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self) -> GuestSession {
        GuestSession {
            responses_left: self.policy.response_limit,
            reset_time: None,
        }
    }

    pub async fn peek_at(&self, session_id: &str, now: DateTime<Utc>) -> GuestSession {
        let now_ms = now.timestamp_millis();
        let windows = self.windows.lock().await;

        match windows.get(&hash_session_id(session_id)) {
            Some(window) if !window.is_expired(&self.policy, now_ms) => window.session(&self.policy),
            _ => self.fresh(),
        }
    }

    pub async fn consume_at(&self, session_id: &str, now: DateTime<Utc>) -> GuestDecision {
        let now_ms = now.timestamp_millis();
        let policy = self.policy;
        let mut windows = self.windows.lock().await;

        if windows.len() >= MEMORY_SWEEP_THRESHOLD {
            windows.retain(|_, w| !w.is_expired(&policy, now_ms));
        }

        let window = windows
            .entry(hash_session_id(session_id))
            .or_insert(GuestWindow {
                used: 0,
                started_ms: now_ms,
            });

        if window.is_expired(&policy, now_ms) {
            *window = GuestWindow {
                used: 0,
                started_ms: now_ms,
            };
        }

        if window.used >= policy.response_limit {
            return GuestDecision::Exhausted {
                session: window.session(&policy),
                retry_after: seconds_until(window.reset_ms(&policy), now_ms),
            };
        }

        window.used += 1;
        GuestDecision::Allowed(window.session(&policy))
    }

    pub async fn refund_at(
        &self,
        session_id: &str,
        window_reset: i64,
        now: DateTime<Utc>,
    ) -> Option<GuestSession> {
        let now_ms = now.timestamp_millis();
        let mut windows = self.windows.lock().await;

        let window = windows.get_mut(&hash_session_id(session_id))?;
        if window.is_expired(&self.policy, now_ms)
            || window.reset_ms(&self.policy) != window_reset
            || window.used == 0
        {
            return None;
        }

        window.used -= 1;
        Some(window.session(&self.policy))
    }
}

#[async_trait]
impl GuestLimiter for MemoryGuestLimiter {
    async fn peek(&self, session_id: &str) -> Result<GuestSession, GuestLimitError> {
        validate_session_id(session_id)?;
        Ok(self.peek_at(session_id, Utc::now()).await)
    }

    async fn consume(&self, session_id: &str) -> Result<GuestDecision, GuestLimitError> {
        validate_session_id(session_id)?;
        Ok(self.consume_at(session_id, Utc::now()).await)
    }

    async fn refund(
        &self,
        session_id: &str,
        window_reset: i64,
    ) -> Result<Option<GuestSession>, GuestLimitError> {
        validate_session_id(session_id)?;
        Ok(self.refund_at(session_id, window_reset, Utc::now()).await)
    }
}

/// Atomic counter update; returns `{responses_left, reset_ms, applied}`
///
/// `reset_ms` is -1 when the session has no open window. A refund only
/// applies while the open window still ends at `ARGV[5]`.
const GUEST_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local mode = ARGV[4]
local window_reset = tonumber(ARGV[5])

local data = redis.call('HMGET', key, 'used', 'started')
local used = tonumber(data[1]) or 0
local started = tonumber(data[2])

if started and now >= started + window_ms then
    redis.call('DEL', key)
    used = 0
    started = nil
end

if mode == 'peek' then
    if not started then
        return {limit, -1, 0}
    end
    return {math.max(limit - used, 0), started + window_ms, 0}
end

if mode == 'refund' then
    if not started then
        return {limit, -1, 0}
    end
    if started + window_ms ~= window_reset or used == 0 then
        return {math.max(limit - used, 0), started + window_ms, 0}
    end
    used = used - 1
    redis.call('HSET', key, 'used', used)
    return {limit - used, started + window_ms, 1}
end

if not started then
    started = now
    used = 0
end

if used >= limit then
    return {0, started + window_ms, 0}
end

used = used + 1
redis.call('HSET', key, 'used', used, 'started', started)
redis.call('PEXPIREAT', key, started + window_ms)
return {limit - used, started + window_ms, 1}
"#;

/// Limiter backed by Redis so counters survive restarts and are shared
/// between API instances
#[derive(Clone)]
pub struct RedisGuestLimiter {
    policy: GuestPolicy,
    conn: ConnectionManager,
    script: std::sync::Arc<redis::Script>,
}

impl RedisGuestLimiter {
    pub async fn connect(redis_url: &str, policy: GuestPolicy) -> Result<Self, GuestLimitError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!("Guest limiter connected to Redis");

        Ok(Self {
            policy,
            conn,
            script: std::sync::Arc::new(redis::Script::new(GUEST_SCRIPT)),
        })
    }

    fn key(session_id: &str) -> String {
        format!("lynix:guest:{}", hash_session_id(session_id))
    }

    async fn run(
        &self,
        session_id: &str,
        mode: &str,
        window_reset: i64,
    ) -> Result<(GuestSession, bool, i64), GuestLimitError> {
        validate_session_id(session_id)?;

        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        let result: Vec<i64> = self
            .script
            .key(Self::key(session_id))
            .arg(self.policy.response_limit)
            .arg(self.policy.window_ms())
            .arg(now_ms)
            .arg(mode)
            .arg(window_reset)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, mode, "Guest limiter script failed");
                GuestLimitError::from(e)
            })?;

        let &[left, reset_ms, applied] = result.as_slice() else {
            return Err(GuestLimitError::Backend(format!(
                "unexpected script reply of {} values",
                result.len()
            )));
        };

        let session = GuestSession {
            responses_left: left.max(0) as u32,
            reset_time: (reset_ms >= 0).then_some(reset_ms),
        };

        Ok((session, applied == 1, now_ms))
    }
}

#[async_trait]
impl GuestLimiter for RedisGuestLimiter {
    async fn peek(&self, session_id: &str) -> Result<GuestSession, GuestLimitError> {
        let (session, _, _) = self.run(session_id, "peek", -1).await?;
        Ok(session)
    }

    async fn consume(&self, session_id: &str) -> Result<GuestDecision, GuestLimitError> {
        let (session, allowed, now_ms) = self.run(session_id, "consume", -1).await?;

        if allowed {
            return Ok(GuestDecision::Allowed(session));
        }

        let retry_after = session
            .reset_time
            .map(|reset| seconds_until(reset, now_ms))
            .unwrap_or(0);

        Ok(GuestDecision::Exhausted {
            session,
            retry_after,
        })
    }

    async fn refund(
        &self,
        session_id: &str,
        window_reset: i64,
    ) -> Result<Option<GuestSession>, GuestLimitError> {
        let (session, applied, _) = self.run(session_id, "refund", window_reset).await?;
        Ok(applied.then_some(session))
    }
}

/// Formats an epoch-millisecond reset time for logs
pub fn describe_reset(reset_time: Option<i64>) -> String {
    reset_time
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "not started".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const SESSION: &str = "guest-session-0001";

    fn limiter(limit: u32, window_secs: u64) -> MemoryGuestLimiter {
        MemoryGuestLimiter::new(GuestPolicy {
            response_limit: limit,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = GuestPolicy::default();
        assert_eq!(policy.response_limit, 5);
        assert_eq!(policy.window, Duration::from_secs(3600));
    }

    #[test]
    fn test_generate_session_id() {
        let a = generate_session_id();
        let b = generate_session_id();

        assert_eq!(a.len(), SESSION_ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
        assert!(validate_session_id(&a).is_ok());
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("abc_DEF-1234").is_ok());
        assert!(validate_session_id("short").is_err());
        assert!(validate_session_id("has spaces in it").is_err());
        assert!(validate_session_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_hash_session_id() {
        let hash = hash_session_id(SESSION);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_session_id(SESSION));
        assert_ne!(hash, hash_session_id("guest-session-0002"));
    }

    #[test]
    fn test_seconds_until_rounds_up() {
        assert_eq!(seconds_until(10_001, 0), 11);
        assert_eq!(seconds_until(10_000, 0), 10);
        assert_eq!(seconds_until(0, 5_000), 0);
    }

    #[tokio::test]
    async fn test_fresh_session_has_full_budget() {
        let limiter = limiter(5, 3600);
        let session = limiter.peek_at(SESSION, Utc::now()).await;

        assert_eq!(session.responses_left, 5);
        assert_eq!(session.reset_time, None);
    }

    #[tokio::test]
    async fn test_budget_decrements() {
        let limiter = limiter(3, 3600);
        let now = Utc::now();

        for expected_left in [2, 1, 0] {
            let decision = limiter.consume_at(SESSION, now).await;
            assert!(decision.is_allowed());
            assert_eq!(decision.session().responses_left, expected_left);
        }

        let reset = now.timestamp_millis() + 3_600_000;
        assert_eq!(limiter.peek_at(SESSION, now).await.reset_time, Some(reset));
    }

    #[tokio::test]
    async fn test_exhausted_reports_retry_after() {
        let limiter = limiter(2, 60);
        let start = Utc::now();

        limiter.consume_at(SESSION, start).await;
        limiter.consume_at(SESSION, start).await;

        let later = start + ChronoDuration::seconds(15);
        match limiter.consume_at(SESSION, later).await {
            GuestDecision::Exhausted { session, retry_after } => {
                assert_eq!(session.responses_left, 0);
                assert_eq!(retry_after, 45);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_window_reset_restores_budget() {
        let limiter = limiter(1, 60);
        let start = Utc::now();

        assert!(limiter.consume_at(SESSION, start).await.is_allowed());
        assert!(!limiter.consume_at(SESSION, start).await.is_allowed());

        let after_window = start + ChronoDuration::seconds(60);
        assert_eq!(limiter.peek_at(SESSION, after_window).await.responses_left, 1);

        let decision = limiter.consume_at(SESSION, after_window).await;
        assert!(decision.is_allowed());
        assert_eq!(
            decision.session().reset_time,
            Some(after_window.timestamp_millis() + 60_000)
        );
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let limiter = limiter(1, 60);
        let now = Utc::now();

        assert!(limiter.consume_at(SESSION, now).await.is_allowed());
        assert!(limiter.consume_at("guest-session-0002", now).await.is_allowed());
    }

    #[tokio::test]
    async fn test_refund_returns_a_response() {
        let limiter = limiter(1, 60);
        let now = Utc::now();

        let spent = limiter.consume_at(SESSION, now).await.session();
        let refunded = limiter
            .refund_at(SESSION, spent.reset_time.unwrap(), now)
            .await
            .unwrap();

        assert_eq!(refunded.responses_left, 1);
        assert_eq!(limiter.peek_at(SESSION, now).await.responses_left, 1);
        assert!(limiter.consume_at(SESSION, now).await.is_allowed());
    }

    #[tokio::test]
    async fn test_refund_after_window_rollover_is_dropped() {
        let limiter = limiter(1, 60);
        let start = Utc::now();

        let first = limiter.consume_at(SESSION, start).await.session();
        assert!(first.reset_time.is_some());

        // Request spanned the boundary; the next window already spent its budget
        let next_window = start + ChronoDuration::seconds(61);
        assert!(limiter.consume_at(SESSION, next_window).await.is_allowed());

        let refunded = limiter
            .refund_at(SESSION, first.reset_time.unwrap(), next_window)
            .await;
        assert_eq!(refunded, None);

        assert_eq!(limiter.peek_at(SESSION, next_window).await.responses_left, 0);
        assert!(!limiter.consume_at(SESSION, next_window).await.is_allowed());
    }

    #[tokio::test]
    async fn test_refund_without_spend_is_dropped() {
        let limiter = limiter(2, 60);
        let now = Utc::now();

        let reset = now.timestamp_millis() + 60_000;
        assert_eq!(limiter.refund_at(SESSION, reset, now).await, None);

        let spent = limiter.consume_at(SESSION, now).await.session();
        let window_reset = spent.reset_time.unwrap();
        assert!(limiter.refund_at(SESSION, window_reset, now).await.is_some());
        assert_eq!(limiter.refund_at(SESSION, window_reset, now).await, None);
        assert_eq!(limiter.peek_at(SESSION, now).await.responses_left, 2);
    }

    #[tokio::test]
    async fn test_trait_rejects_bad_session_id() {
        let limiter = limiter(5, 60);
        assert!(matches!(
            limiter.consume("bad id").await,
            Err(GuestLimitError::InvalidSession)
        ));
    }

    #[test]
    fn test_session_wire_format() {
        let session = GuestSession {
            responses_left: 4,
            reset_time: Some(1_700_000_000_000),
        };
        let json = serde_json::to_value(session).unwrap();

        assert_eq!(json["responsesLeft"], 4);
        assert_eq!(json["resetTime"], 1_700_000_000_000i64);

        let fresh = serde_json::to_value(GuestSession {
            responses_left: 5,
            reset_time: None,
        })
        .unwrap();
        assert!(fresh["resetTime"].is_null());
    }

    #[test]
    fn test_describe_reset() {
        assert_eq!(describe_reset(None), "not started");
        assert!(describe_reset(Some(0)).starts_with("1970-01-01"));
    }
}
