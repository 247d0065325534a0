use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::CreateOrderRequest,
    AppState,
};

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state.services.orders.get_order(order_id).await?;
    Ok(Json(details))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(params.page, params.per_page)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub note: Option<String>,
    pub actor: Option<String>,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let new_status =
        OrderStatus::from_str(&request.status).map_err(ServiceError::ValidationError)?;
    let order = state
        .services
        .orders
        .update_order_status(order_id, new_status, request.note, request.actor)
        .await?;
    Ok(Json(order))
}

pub async fn get_next_statuses(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let statuses = state.services.orders.get_valid_next_statuses(order_id).await?;
    Ok(Json(statuses))
}

pub async fn get_status_history(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let history = state.services.orders.get_status_history(order_id).await?;
    Ok(Json(history))
}
