use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{patch, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{error::AppResult, state::AppState};

use super::dto::{SaveFinancialDataRequest, UpdateFinancialDataRequest, WriteReceipt};
use super::services;

pub fn financial_routes() -> Router<AppState> {
    Router::new()
        .route("/save-financial-data", post(save_financial_data))
        .route("/update-financial-data/:owner", patch(update_financial_data))
        .route("/replace-financial-data", put(replace_financial_data))
}

#[instrument(skip(state, payload))]
pub async fn save_financial_data(
    State(state): State<AppState>,
    payload: Result<Json<SaveFinancialDataRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<WriteReceipt>)> {
    let Json(payload) = payload?;
    let receipt = services::save_financial_data(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// PATCH /update-financial-data/:owner, where `owner` is an email or a user id.
#[instrument(skip(state, payload))]
pub async fn update_financial_data(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    payload: Result<Json<UpdateFinancialDataRequest>, JsonRejection>,
) -> AppResult<Json<WriteReceipt>> {
    let Json(payload) = payload?;
    let receipt = services::update_financial_data(&state, &owner, payload).await?;
    Ok(Json(receipt))
}

#[instrument(skip(state, payload))]
pub async fn replace_financial_data(
    State(state): State<AppState>,
    payload: Result<Json<SaveFinancialDataRequest>, JsonRejection>,
) -> AppResult<Json<WriteReceipt>> {
    let Json(payload) = payload?;
    let receipt = services::replace_financial_data(&state, payload).await?;
    Ok(Json(receipt))
}
