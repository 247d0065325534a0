use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{entities::payment::PaymentProvider, errors::ServiceError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub provider: PaymentProvider,
    pub method: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state
        .services
        .payments
        .create_payment(order_id, request.provider, request.method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Returns the latest persisted payment state; a just-received but
/// not-yet-processed webhook may not be reflected yet.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state.services.payments.get_payment(payment_id).await?;
    Ok(Json(payment))
}

#[derive(Debug, Deserialize)]
pub struct ManualVerifyRequest {
    pub verified_by: String,
    pub note: Option<String>,
}

pub async fn manually_verify_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<ManualVerifyRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state
        .services
        .payments
        .manually_verify_payment(payment_id, &request.verified_by, request.note)
        .await?;
    Ok(Json(payment))
}
