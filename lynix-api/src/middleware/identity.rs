/// Caller identity layer
///
/// Resolves the caller from the request headers and stores an
/// [`Identity`] in the request extensions. Requests without credentials are
/// rejected with 401 before reaching a handler.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use lynix_shared::auth::identity::{resolve_identity, Identity, IdentityError};

pub async fn identity_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity: Identity = resolve_identity(
        req.headers(),
        &state.config.auth.jwt_secret,
        state.config.auth.allow_header_identity,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "Rejected credentials");
        e
    })?
    .ok_or(IdentityError::MissingCredentials)?;

    tracing::debug!(user_id = %identity.user_id, method = ?identity.method, "Caller identified");

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
