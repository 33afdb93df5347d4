/// Periodic housekeeping sweep
///
/// Every tick the sweeper:
///
/// 1. Marks calls that have been ringing longer than the ring timeout as
///    `missed` (stamping `end_time`)
/// 2. Clears notepads whose last save is more than 72 hours old
///
/// The API also clears an expired note lazily when it is read, so the sweep
/// only bounds how long stale text sits in the database.
///
/// # Example
///
/// ```no_run
/// use lynix_worker::sweeper::{SweepPolicy, Sweeper};
/// use sqlx::PgPool;
/// use std::time::Duration;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let policy = SweepPolicy::new(Duration::from_secs(30), Duration::from_secs(60))?;
/// let sweeper = Sweeper::new(pool, policy);
///
/// let token = sweeper.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     token.cancel();
/// });
///
/// sweeper.run().await;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use lynix_shared::models::{
    call::Call,
    user::{User, NOTEPAD_EXPIRATION_HOURS},
};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Longest ring timeout a policy accepts
pub const MAX_RING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// How often to sweep and what counts as stale
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    /// Time between sweeps
    pub interval: Duration,

    /// Ringing calls older than this are marked missed
    pub ring_timeout: chrono::Duration,

    /// Notes saved longer ago than this are cleared
    pub notepad_ttl: chrono::Duration,
}

impl SweepPolicy {
    pub fn new(interval: Duration, ring_timeout: Duration) -> anyhow::Result<Self> {
        if ring_timeout > MAX_RING_TIMEOUT {
            anyhow::bail!(
                "ring timeout must be at most {} seconds",
                MAX_RING_TIMEOUT.as_secs()
            );
        }

        let ring_timeout = chrono::Duration::from_std(ring_timeout)
            .map_err(|_| anyhow::anyhow!("ring timeout is out of range"))?;

        Ok(Self {
            interval,
            ring_timeout,
            notepad_ttl: chrono::Duration::hours(NOTEPAD_EXPIRATION_HOURS),
        })
    }

    /// Calls created before this instant are stale
    pub fn ringing_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.ring_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Notes saved before this instant are stale
    pub fn notepad_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.notepad_ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// What one sweep changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub missed_calls: usize,

    pub cleared_notes: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.missed_calls == 0 && self.cleared_notes == 0
    }
}

pub struct Sweeper {
    db: PgPool,

    policy: SweepPolicy,

    shutdown_token: CancellationToken,
}

impl Sweeper {
    pub fn new(db: PgPool, policy: SweepPolicy) -> Self {
        Sweeper {
            db,
            policy,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs one sweep as of `now`
    ///
    /// # Errors
    ///
    /// Returns the first database error; changes made before it stay applied.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, sqlx::Error> {
        let missed = Call::expire_ringing(&self.db, self.policy.ringing_cutoff(now)).await?;

        for call in &missed {
            tracing::info!(
                call_id = call.id,
                caller_id = %call.caller_id,
                receiver_id = %call.receiver_id,
                "Unanswered call marked missed"
            );
        }

        let cleared_notes =
            User::clear_notepads_saved_before(&self.db, self.policy.notepad_cutoff(now)).await?;

        Ok(SweepReport {
            missed_calls: missed.len(),
            cleared_notes,
        })
    }

    /// Sweeps on every tick until the shutdown token is cancelled
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.policy.interval.as_secs(),
            ring_timeout_secs = self.policy.ring_timeout.num_seconds(),
            "Sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_token.cancelled() => break,

                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.is_empty() => tracing::trace!("Nothing to sweep"),
                        Ok(report) => tracing::info!(
                            missed_calls = report.missed_calls,
                            cleared_notes = report.cleared_notes,
                            "Sweep complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "Sweep failed"),
                    }
                }
            }
        }

        tracing::info!("Sweeper stopped");
    }
}
