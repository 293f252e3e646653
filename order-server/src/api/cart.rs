//! Cart quote (pre-order breakdown)

use axum::{Json, Router, extract::State, routing::post};
use shared::error::AppResult;
use shared::order::{Breakdown, CartQuoteRequest};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/cart/quote", post(quote))
}

/// Same calculator the invoice uses, so the cart total matches the bill
async fn quote(
    State(state): State<ServerState>,
    Json(payload): Json<CartQuoteRequest>,
) -> AppResult<Json<Breakdown>> {
    let breakdown = state.orders.quote(&payload.items)?;
    Ok(Json(breakdown))
}
