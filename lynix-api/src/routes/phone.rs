/// Call signaling endpoints
///
/// Both participants poll `GET /api/phone/status` every few seconds and move
/// the call along with `PUT /api/phone/calls/:id`. Which moves are legal is
/// decided by [`CallStatus::can_transition_to`]; the UPDATE itself re-checks
/// the source status, so two racing requests cannot both apply.
///
/// # Endpoints
///
/// - `GET /api/phone/users` - Directory of everyone who can be called
/// - `GET /api/phone/status` - The caller's current call, or `null`
/// - `POST /api/phone/call` - Ring another user
/// - `PUT /api/phone/calls/:id` - Answer, decline or hang up
/// - `/api/phone?type=...` - Older query-string form of the above

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{non_blank, parse_numeric_id},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use lynix_shared::{
    auth::identity::Identity,
    models::{
        call::{Call, CallStatus, Transition},
        user::{User, UserSummary},
    },
};
use serde::{de::DeserializeOwned, Deserialize};

/// Methods the query-string dispatcher answers to
const LEGACY_ALLOW: &str = "GET, POST, PUT";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCallRequest {
    pub receiver_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCallRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub id: Option<String>,
}

async fn directory(state: &AppState) -> ApiResult<Vec<UserSummary>> {
    Ok(User::list_directory(state.db()?).await?)
}

async fn current_call(state: &AppState, identity: &Identity) -> ApiResult<Option<Call>> {
    Ok(Call::find_active_for_user(state.db()?, &identity.user_id).await?)
}

async fn ring(state: &AppState, identity: &Identity, req: PlaceCallRequest) -> ApiResult<Call> {
    let receiver_id = non_blank(req.receiver_id)
        .ok_or_else(|| ApiError::BadRequest("receiverId is required.".to_string()))?;

    if identity.is(&receiver_id) {
        return Err(ApiError::BadRequest("You cannot call yourself.".to_string()));
    }

    let db = state.db()?;
    let caller = User::find_by_id(db, &identity.user_id).await?;
    let receiver = User::find_by_id(db, &receiver_id).await?;

    let (Some(caller), Some(receiver)) = (caller, receiver) else {
        return Err(ApiError::NotFound("Caller or receiver not found.".to_string()));
    };

    let call = Call::create(
        db,
        &UserSummary {
            id: caller.id,
            username: caller.username,
        },
        &UserSummary {
            id: receiver.id,
            username: receiver.username,
        },
    )
    .await?;

    tracing::info!(
        call_id = call.id,
        caller = %call.caller_id,
        receiver = %call.receiver_id,
        "Call placed"
    );

    Ok(call)
}

/// Validates a requested status before touching the database
fn requested_status(raw: Option<String>) -> ApiResult<CallStatus> {
    let status = raw
        .as_deref()
        .map(str::trim)
        .and_then(CallStatus::parse)
        .ok_or_else(|| ApiError::BadRequest("Invalid status provided.".to_string()))?;

    if !status.is_client_settable() {
        return Err(ApiError::BadRequest(
            "This status update is not permitted.".to_string(),
        ));
    }

    Ok(status)
}

async fn transition(
    state: &AppState,
    identity: &Identity,
    raw_id: &str,
    req: UpdateCallRequest,
) -> ApiResult<Call> {
    let not_found = || ApiError::NotFound("Call not found.".to_string());

    let id = parse_numeric_id(raw_id, "Invalid call ID.")?.ok_or_else(not_found)?;
    let target = requested_status(req.status)?;

    match Call::transition(state.db()?, id, &identity.user_id, target).await? {
        Transition::Applied(call) => {
            tracing::info!(
                call_id = call.id,
                status = call.status.as_str(),
                by = %identity.user_id,
                "Call updated"
            );
            Ok(call)
        }
        Transition::NotFound => Err(not_found()),
        Transition::Rejected { current } => {
            tracing::debug!(
                call_id = id,
                current = current.as_str(),
                target = target.as_str(),
                "Call transition rejected"
            );
            Err(ApiError::Conflict(format!(
                "Call is already {} and cannot become {}.",
                current.as_str(),
                target.as_str()
            )))
        }
    }
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(directory(&state).await?))
}

/// Serializes to JSON `null` when the caller has no call in progress
pub async fn call_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Option<Call>>> {
    Ok(Json(current_call(&state, &identity).await?))
}

pub async fn place_call(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PlaceCallRequest>,
) -> ApiResult<(StatusCode, Json<Call>)> {
    let call = ring(&state, &identity, req).await?;
    Ok((StatusCode::CREATED, Json(call)))
}

pub async fn update_call(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
    Json(req): Json<UpdateCallRequest>,
) -> ApiResult<Json<Call>> {
    Ok(Json(transition(&state, &identity, &raw_id, req).await?))
}

/// Reads an optional JSON body; an empty body yields the default
fn legacy_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Request body is not valid JSON: {}", e)))
}

/// `/api/phone?type=users|status|call|call-update[&id=N]`
///
/// Any other method and `type` combination answers 405 with an `Allow`
/// header.
pub async fn legacy_dispatch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    method: Method,
    Query(query): Query<LegacyQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let kind = query.kind.as_deref().unwrap_or_default();

    let response = match kind {
        "users" if method == Method::GET => Json(directory(&state).await?).into_response(),
        "status" if method == Method::GET => {
            Json(current_call(&state, &identity).await?).into_response()
        }
        "call" if method == Method::POST => {
            let call = ring(&state, &identity, legacy_body(&body)?).await?;
            (StatusCode::CREATED, Json(call)).into_response()
        }
        "call-update" if method == Method::PUT && query.id.is_some() => {
            let raw_id = query.id.as_deref().unwrap_or_default();
            let call = transition(&state, &identity, raw_id, legacy_body(&body)?).await?;
            Json(call).into_response()
        }
        _ => {
            return Err(ApiError::MethodNotAllowed {
                allow: LEGACY_ALLOW,
                message: format!("Method {} Not Allowed", method),
            })
        }
    };

    Ok(response)
}
