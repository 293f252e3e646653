//! 管理后台统计

use axum::{Json, Router, extract::State, routing::get};
use shared::error::AppResult;
use shared::order::OrderStats;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/admin/dashboard/stats", get(dashboard_stats))
}

async fn dashboard_stats(State(state): State<ServerState>) -> AppResult<Json<OrderStats>> {
    Ok(Json(state.orders.stats().await?))
}
