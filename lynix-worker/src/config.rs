/// Configuration for the housekeeping worker
///
/// # Environment Variables
///
/// | Variable | Default | Notes |
/// |----------|---------|-------|
/// | `DATABASE_URL` / `POSTGRES_URL` | required | |
/// | `DATABASE_MAX_CONNECTIONS` | `2` | |
/// | `SWEEP_INTERVAL_SECONDS` | `30` | time between sweeps |
/// | `RING_TIMEOUT_SECONDS` | `60` | ringing calls older than this become `missed`; at most one day |

use crate::sweeper::MAX_RING_TIMEOUT;
use std::{env, time::Duration};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,

    pub max_connections: u32,

    pub sweep_interval: Duration,

    pub ring_timeout: Duration,
}

impl WorkerConfig {
    /// Loads configuration from the process environment (and `.env`)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let seconds = |key: &str, default: u64| -> anyhow::Result<u64> {
            let value = get(key)
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("{}: {}", key, e))?
                .unwrap_or(default);

            if value == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            Ok(value)
        };

        let database_url = get("DATABASE_URL")
            .or_else(|| get("POSTGRES_URL"))
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = get("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS: {}", e))?
            .unwrap_or(2);

        let ring_timeout = Duration::from_secs(seconds("RING_TIMEOUT_SECONDS", 60)?);
        if ring_timeout > MAX_RING_TIMEOUT {
            anyhow::bail!(
                "RING_TIMEOUT_SECONDS must be at most {}",
                MAX_RING_TIMEOUT.as_secs()
            );
        }

        Ok(Self {
            database_url,
            max_connections,
            sweep_interval: Duration::from_secs(seconds("SWEEP_INTERVAL_SECONDS", 30)?),
            ring_timeout,
        })
    }
}
