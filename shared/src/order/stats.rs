//! Admin dashboard aggregates

use super::status::OrderStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopSellingItem {
    pub id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: String,
    pub order_number: String,
    pub total: f64,
    pub status: OrderStatus,
    /// Unix millis
    pub ordered_at: i64,
}

/// Dashboard statistics
///
/// `total_orders` counts every status, so it is at least
/// `pending_orders + completed_orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: i64,
    pub total_revenue: f64,
    pub pending_orders: i64,
    /// Orders in `delivered`
    pub completed_orders: i64,
    pub average_order_value: f64,
    pub top_selling_items: Vec<TopSellingItem>,
    pub recent_orders: Vec<RecentOrder>,
}
