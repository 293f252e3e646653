//! Persistence collaborator for orders
//!
//! The manager only talks to storage through [`OrderStore`]; SQL lives in
//! `crate::db`.

use super::error::OrderResult;
use crate::billing::FeeSchedule;
use async_trait::async_trait;
use shared::order::{
    Order, OrderFilter, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, RecentOrder,
    TopSellingItem,
};

/// Mutable columns written by [`OrderStore::update_order_fields`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFields {
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub delivery_address: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub estimated_time: Option<String>,
    pub notes: Option<String>,
    pub updated_at: i64,
}

impl From<&Order> for OrderFields {
    fn from(order: &Order) -> Self {
        Self {
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            delivery_address: order.delivery_address.clone(),
            customer_name: order.customer_name.clone(),
            customer_phone: order.customer_phone.clone(),
            customer_email: order.customer_email.clone(),
            estimated_time: order.estimated_time.clone(),
            notes: order.notes.clone(),
            updated_at: order.updated_at,
        }
    }
}

/// Order persistence
///
/// Every method fails with `StorageUnavailable` when the backend cannot be
/// reached. Lookups return `Ok(None)` for missing rows.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically advance the order-number sequence and return the new value
    async fn next_order_sequence(&self) -> OrderResult<i64>;

    /// Insert header, the fee schedule it was billed with and the item
    /// snapshot in one transaction
    ///
    /// A taken `order_number` fails with `DuplicateOrderNumber`.
    async fn insert_order(&self, order: &Order, fees: &FeeSchedule) -> OrderResult<()>;

    async fn select_order_by_id(&self, id: &str) -> OrderResult<Option<Order>>;

    async fn select_order_by_number(&self, order_number: &str) -> OrderResult<Option<Order>>;

    /// Persisted item snapshot, in checkout order
    async fn select_order_items(&self, order_id: &str) -> OrderResult<Vec<OrderItem>>;

    /// Fee schedule recorded at checkout, `None` if the order has none
    async fn select_order_fees(&self, order_id: &str) -> OrderResult<Option<FeeSchedule>>;

    /// Filtered list, newest first
    async fn select_orders(&self, filter: &OrderFilter) -> OrderResult<Vec<Order>>;

    /// Write the mutable columns if the row still has `expected_status` and
    /// `expected_updated_at`
    ///
    /// Returns `false` when the row is gone or was written in between.
    async fn update_order_fields(
        &self,
        id: &str,
        fields: &OrderFields,
        expected_status: OrderStatus,
        expected_updated_at: i64,
    ) -> OrderResult<bool>;

    /// Returns whether a row was deleted
    async fn delete_order(&self, id: &str) -> OrderResult<bool>;

    /// Returns the number of deleted orders
    async fn delete_all_orders(&self) -> OrderResult<u64>;

    async fn count_orders(&self) -> OrderResult<i64>;

    async fn count_orders_by_status(&self, status: OrderStatus) -> OrderResult<i64>;

    async fn sum_revenue(&self) -> OrderResult<f64>;

    /// Best sellers by total quantity, ties broken by item id
    async fn aggregate_top_items(&self, limit: i64) -> OrderResult<Vec<TopSellingItem>>;

    /// Most recent orders by creation time
    async fn select_recent_orders(&self, limit: i64) -> OrderResult<Vec<RecentOrder>>;

    /// Cheap reachability check
    async fn ping(&self) -> OrderResult<()>;
}
