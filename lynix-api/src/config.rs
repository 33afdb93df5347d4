/// Configuration for the API server
///
/// Everything comes from environment variables, with a `.env` file loaded
/// first when present.
///
/// # Environment Variables
///
/// | Variable | Default | Notes |
/// |----------|---------|-------|
/// | `API_HOST` | `0.0.0.0` | |
/// | `API_PORT` | `8080` | |
/// | `CORS_ORIGINS` | `*` | comma separated |
/// | `PRODUCTION` | `false` | enables HSTS |
/// | `DATABASE_URL` / `POSTGRES_URL` | unset | unset means every data endpoint answers 503 |
/// | `DATABASE_MAX_CONNECTIONS` | `10` | |
/// | `JWT_SECRET` | required | at least 32 characters |
/// | `ALLOW_HEADER_IDENTITY` | `true` | accept `x-user-id` |
/// | `GEMINI_API_KEY` / `API_KEY` | unset | unset means assistant endpoints answer 503 |
/// | `GEMINI_MODEL` | `gemini-2.5-flash` | |
/// | `GEMINI_BASE_URL` | Google's v1beta endpoint | |
/// | `GUEST_RESPONSE_LIMIT` | `5` | |
/// | `GUEST_WINDOW_SECONDS` | `3600` | |
/// | `REDIS_URL` | unset | guest counters in Redis instead of memory |
/// | `ADMIN_USERNAME`, `ADMIN_PASSWORD`, `ADMIN_EMAIL` | unset | bootstrap admin |

use lynix_shared::assistant::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::env;

/// Minimum length of `JWT_SECRET`
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    /// None when no database URL is configured
    pub database: Option<DatabaseConfig>,

    pub auth: AuthConfig,

    pub assistant: AssistantSettings,

    pub guest: GuestSettings,

    /// Admin account created at startup when no admin exists
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (adds HSTS)
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Accept the unsigned `x-user-id` header as identity
    pub allow_header_identity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub model: String,

    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestSettings {
    pub response_limit: u32,

    pub window_seconds: u64,

    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    pub email: String,
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = get("API_PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("API_PORT: {}", e))?
            .unwrap_or(8080);

        let cors_origins = get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let production = get("PRODUCTION")
            .map(|v| parse_bool(&v))
            .transpose()
            .map_err(|e| anyhow::anyhow!("PRODUCTION: {}", e))?
            .unwrap_or(false);

        let max_connections = get("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS: {}", e))?
            .unwrap_or(10);

        let database = get("DATABASE_URL")
            .or_else(|| get("POSTGRES_URL"))
            .map(|url| DatabaseConfig {
                url,
                max_connections,
            });

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LEN
            );
        }

        let allow_header_identity = get("ALLOW_HEADER_IDENTITY")
            .map(|v| parse_bool(&v))
            .transpose()
            .map_err(|e| anyhow::anyhow!("ALLOW_HEADER_IDENTITY: {}", e))?
            .unwrap_or(true);

        let assistant = AssistantSettings {
            api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        let response_limit = get("GUEST_RESPONSE_LIMIT")
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("GUEST_RESPONSE_LIMIT: {}", e))?
            .unwrap_or(5);

        let window_seconds = get("GUEST_WINDOW_SECONDS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("GUEST_WINDOW_SECONDS: {}", e))?
            .unwrap_or(3600);

        if window_seconds == 0 {
            anyhow::bail!("GUEST_WINDOW_SECONDS must be greater than zero");
        }

        let guest = GuestSettings {
            response_limit,
            window_seconds,
            redis_url: get("REDIS_URL"),
        };

        let bootstrap_admin = match (get("ADMIN_USERNAME"), get("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => {
                let email = get("ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{}@lynixity.x10.bz", username.to_lowercase()));
                Some(BootstrapAdmin {
                    username,
                    password,
                    email,
                })
            }
            (Some(_), None) => anyhow::bail!("ADMIN_USERNAME is set but ADMIN_PASSWORD is not"),
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
            },
            database,
            auth: AuthConfig {
                jwt_secret,
                allow_header_identity,
            },
            assistant,
            guest,
            bootstrap_admin,
        })
    }

    /// Gets the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
