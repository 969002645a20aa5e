use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{PublicUser, SigninRequest, SignupRequest},
        services::{authenticate, register},
    },
    error::{AppError, AppResult},
    snapshots::dto::FinancialDataResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let Json(payload) = payload?;
    let user = register(state.accounts.as_ref(), &payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

/// Verifies the credentials and answers with the user's financial data.
/// No session or token is issued.
#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> AppResult<Json<FinancialDataResponse>> {
    let Json(payload) = payload?;

    // Unknown email and wrong password look the same to the client.
    let user = authenticate(state.accounts.as_ref(), &payload.email, &payload.password)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::InvalidCredential,
            other => other,
        })?;

    let snapshots = state.snapshots.list(user.id).await?;
    info!(user_id = %user.id, months = snapshots.len(), "user signed in");
    Ok(Json(FinancialDataResponse::new(&user, snapshots)))
}
