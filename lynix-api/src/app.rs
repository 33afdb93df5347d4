/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use lynix_api::{app::{AppState, build_router}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = match &config.database {
///     Some(db) => Some(PgPool::connect(&db.url).await?),
///     None => None,
/// };
/// let state = AppState::from_config(pool, config).await?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    middleware::{guest::guest_budget_layer, identity::identity_layer, security::SecurityHeadersLayer},
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{any, get, post, put},
    Router,
};
use lynix_shared::{
    assistant::{Assistant, AssistantConfig, GeminiAssistant},
    auth::identity::USER_ID_HEADER,
    guest::{GuestLimiter, GuestPolicy, MemoryGuestLimiter, RedisGuestLimiter, GUEST_SESSION_HEADER},
};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request via Axum's `State` extractor; everything inside
/// is behind an `Arc` or is itself a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Connection pool; None when no database URL is configured
    pub db: Option<PgPool>,

    pub config: Arc<Config>,

    pub guest_limiter: Arc<dyn GuestLimiter>,

    pub assistant: Arc<dyn Assistant>,
}

impl AppState {
    pub fn new(
        db: Option<PgPool>,
        config: Config,
        guest_limiter: Arc<dyn GuestLimiter>,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            guest_limiter,
            assistant,
        }
    }

    /// Builds the production collaborators described by `config`
    ///
    /// Guest counters go to Redis when `REDIS_URL` is set, else to memory.
    pub async fn from_config(db: Option<PgPool>, config: Config) -> anyhow::Result<Self> {
        let policy = GuestPolicy {
            response_limit: config.guest.response_limit,
            window: Duration::from_secs(config.guest.window_seconds),
        };

        let guest_limiter: Arc<dyn GuestLimiter> = match &config.guest.redis_url {
            Some(url) => Arc::new(RedisGuestLimiter::connect(url, policy).await?),
            None => {
                tracing::info!("REDIS_URL not set; guest counters kept in memory");
                Arc::new(MemoryGuestLimiter::new(policy))
            }
        };

        let assistant = Arc::new(GeminiAssistant::new(AssistantConfig {
            api_key: config.assistant.api_key.clone(),
            model: config.assistant.model.clone(),
            base_url: config.assistant.base_url.clone(),
            ..Default::default()
        })?);

        Ok(Self::new(db, config, guest_limiter, assistant))
    }

    /// The connection pool, or 503 when the server runs without a database
    pub fn db(&self) -> ApiResult<&PgPool> {
        self.db.as_ref().ok_or_else(ApiError::database_unconfigured)
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.auth.jwt_secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /health                              public
/// /api/auth                     POST   public
/// /api/assistant/guest/session  GET    public
/// /api/assistant/guest/chat     POST   guest budget
/// /api/users[/me|/:id]                 identity (admin for all but /me)
/// /api/contacts[/:id]                  identity
/// /api/phone[?type=]                   identity (legacy dispatcher)
/// /api/phone/{users,status,call,calls/:id}
/// /api/chat/{users,messages,alerts}    identity
/// /api/localmail/messages[/:id]        identity + localmail flag
/// /api/notepad                         identity
/// /api/assistant/{chat,greeting}       identity + AI access
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/auth", post(routes::auth::sign_in))
        .route("/assistant/guest/session", get(routes::assistant::guest_session));

    let guest_routes = Router::new()
        .route("/assistant/guest/chat", post(routes::assistant::guest_chat))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guest_budget_layer,
        ));

    let protected_routes = Router::new()
        .route(
            "/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route("/users/me", get(routes::users::me))
        .route(
            "/users/:id",
            put(routes::users::update_user)
                .patch(routes::users::change_password)
                .delete(routes::users::delete_user),
        )
        .route(
            "/contacts",
            get(routes::contacts::list_contacts).post(routes::contacts::create_contact),
        )
        .route(
            "/contacts/:id",
            put(routes::contacts::update_contact).delete(routes::contacts::delete_contact),
        )
        .route("/phone", any(routes::phone::legacy_dispatch))
        .route("/phone/users", get(routes::phone::list_users))
        .route("/phone/status", get(routes::phone::call_status))
        .route("/phone/call", post(routes::phone::place_call))
        .route("/phone/calls/:id", put(routes::phone::update_call))
        .route("/chat/users", get(routes::chat::list_users))
        .route(
            "/chat/messages",
            get(routes::chat::conversation).post(routes::chat::send_message),
        )
        .route("/chat/alerts", get(routes::chat::alerts))
        .route(
            "/localmail/messages",
            get(routes::localmail::list_mail).post(routes::localmail::send_mail),
        )
        .route("/localmail/messages/:id", get(routes::localmail::open_mail))
        .route(
            "/notepad",
            get(routes::notepad::load_note).put(routes::notepad::save_note),
        )
        .route("/assistant/chat", post(routes::assistant::chat))
        .route("/assistant/greeting", get(routes::assistant::greeting))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            identity_layer,
        ));

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(guest_routes)
        .merge(protected_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(GUEST_SESSION_HEADER),
        ])
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static(crate::middleware::guest::RESPONSES_LEFT_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
