//! Gateway webhook endpoints.
//!
//! Once the signature checks out, the provider always gets a 200 back, even
//! when internal processing fails: providers retry on non-2xx and a
//! transient internal fault must not trigger a redelivery storm. Failures
//! are logged for out-of-band reconciliation; idempotent reprocessing keeps
//! a later redelivery safe.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::{
    errors::ServiceError,
    services::webhooks::{CardGatewayNotification, PromptPayNotification},
    AppState,
};

const SIGNATURE_HEADER: &str = "x-signature";

// POST /api/v1/payments/webhooks/promptpay
pub async fn promptpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let webhooks = &state.services.webhooks;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());
    if let Err(e) = webhooks.verify_promptpay_signature(signature, &body) {
        return e.into_response();
    }

    let notification: PromptPayNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            return ServiceError::BadRequest(format!("invalid payload: {}", e)).into_response()
        }
    };

    if let Err(e) = webhooks.process_promptpay(notification).await {
        error!(error = %e, "PromptPay webhook processing failed; acknowledging anyway");
    }
    (StatusCode::OK, "ok").into_response()
}

// POST /api/v1/payments/webhooks/card
pub async fn card_webhook(
    State(state): State<AppState>,
    Json(notification): Json<CardGatewayNotification>,
) -> Response {
    let webhooks = &state.services.webhooks;

    if let Err(e) = webhooks.verify_card_hash(&notification) {
        return e.into_response();
    }

    if let Err(e) = webhooks.process_card(notification).await {
        error!(error = %e, "Card webhook processing failed; acknowledging anyway");
    }
    (StatusCode::OK, "ok").into_response()
}
