//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use http::StatusCode;
use serde::Serialize;
use shared::error::{AppError, AppResult};
use shared::order::{
    ForceStatusRequest, Invoice, Order, OrderDraft, OrderFilter, OrderPatch, StatusChangeRequest,
};

use crate::core::ServerState;

/// `{message}` / `{message, deletedCount}` acknowledgements
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            deleted_count: None,
        }
    }
}

/// List orders, newest first
pub async fn list(
    State(state): State<ServerState>,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state.orders.list(&filter).await?;
    tracing::debug!(count = orders.len(), ?filter, "Orders listed");
    Ok(Json(orders))
}

/// Checkout
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<OrderDraft>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let order = state.orders.create(payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get order by id or order number
pub async fn get_by_key(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .get_by_id_or_number(&key)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(order))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .update_by_id_or_number(&key, &patch)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(order))
}

/// Resolve then delete
pub async fn delete(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let existing = state
        .orders
        .get_by_id_or_number(&key)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    // 并发删除时可能已被删掉，结果一样
    state.orders.remove(&existing.id).await?;
    Ok(Json(MessageResponse::new("Order deleted successfully")))
}

pub async fn clear_all(State(state): State<ServerState>) -> AppResult<Json<MessageResponse>> {
    let deleted = state.orders.clear_all().await?;
    Ok(Json(MessageResponse {
        message: "All orders cleared successfully".into(),
        deleted_count: Some(deleted),
    }))
}

/// Lifecycle step (pending → confirmed → ... or cancel)
pub async fn change_status(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Json(payload): Json<StatusChangeRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .transition(&key, payload.status)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(order))
}

/// Admin override, audited
pub async fn force_status(
    State(state): State<ServerState>,
    Path(key): Path<String>,
    Json(payload): Json<ForceStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .force_status(&key, &payload)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(order))
}

pub async fn invoice(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> AppResult<Json<Invoice>> {
    let invoice = state
        .orders
        .invoice(&key)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(invoice))
}

/// Queue a receipt (logged, not sent)
pub async fn email_receipt(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state
        .orders
        .send_receipt(&key)
        .await?
        .ok_or_else(|| AppError::order_not_found(&key))?;
    Ok(Json(MessageResponse::new("Receipt email queued (mock)")))
}
