//! Bill payloads: line input, breakdown, invoice document

use super::status::OrderStatus;
use super::types::{Order, OrderItem, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Two money values within this distance are considered equal
pub const MONEY_TOLERANCE: f64 = 0.01;

/// Price/quantity pair fed to the calculator
///
/// Extra fields sent with a cart line (name, image, ...) are ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BillLine {
    pub price: f64,
    pub quantity: i32,
}

impl From<&OrderItem> for BillLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            price: item.price,
            quantity: item.quantity,
        }
    }
}

/// Itemized bill
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub taxes: f64,
    pub total: f64,
}

impl Breakdown {
    /// Whether a stored or client-sent total agrees with this bill
    pub fn matches_total(&self, total: f64) -> bool {
        total.is_finite() && (self.total - total).abs() <= MONEY_TOLERANCE
    }
}

/// POST /api/cart/quote body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartQuoteRequest {
    #[serde(default)]
    pub items: Vec<BillLine>,
}

/// Invoice for a persisted order, rebuilt from its item snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub order_number: String,
    pub created_at: i64,
    pub restaurant_name: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub breakdown: Breakdown,
}

impl Invoice {
    pub fn new(order: &Order, breakdown: Breakdown) -> Self {
        Self {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            created_at: order.created_at,
            restaurant_name: order.restaurant_name.clone(),
            status: order.status,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            delivery_address: order.delivery_address.clone(),
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            items: order.items.clone(),
            breakdown,
        }
    }
}
