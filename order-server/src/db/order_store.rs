//! SQLite-backed [`OrderStore`]

use async_trait::async_trait;
use shared::error::ErrorCode;
use shared::order::{Order, OrderFilter, OrderItem, OrderStatus, RecentOrder, TopSellingItem};
use sqlx::SqlitePool;

use super::repository::{RepoError, order as repo};
use crate::billing::FeeSchedule;
use crate::orders::error::{OrderError, OrderResult};
use crate::orders::store::{OrderFields, OrderStore};

#[derive(Clone, Debug)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Anything but a constraint hit on insert means the backend misbehaved
fn storage_err(err: RepoError) -> OrderError {
    OrderError::storage(err)
}

/// Classify a failed insert
fn insert_err(err: RepoError, order: &Order) -> OrderError {
    match err {
        RepoError::Duplicate(msg) if msg.contains("orders.order_number") => {
            OrderError::DuplicateOrderNumber(order.order_number.clone())
        }
        RepoError::Duplicate(msg) if msg.contains("orders.id") => OrderError::invalid_with(
            ErrorCode::AlreadyExists,
            format!("Order id {} already exists", order.id),
        ),
        other => storage_err(other),
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn next_order_sequence(&self) -> OrderResult<i64> {
        repo::next_sequence(&self.pool).await.map_err(storage_err)
    }

    async fn insert_order(&self, order: &Order, fees: &FeeSchedule) -> OrderResult<()> {
        repo::create(&self.pool, order, fees)
            .await
            .map_err(|e| insert_err(e, order))
    }

    async fn select_order_by_id(&self, id: &str) -> OrderResult<Option<Order>> {
        repo::find_by_id(&self.pool, id).await.map_err(storage_err)
    }

    async fn select_order_by_number(&self, order_number: &str) -> OrderResult<Option<Order>> {
        repo::find_by_number(&self.pool, order_number)
            .await
            .map_err(storage_err)
    }

    async fn select_order_items(&self, order_id: &str) -> OrderResult<Vec<OrderItem>> {
        repo::find_items(&self.pool, order_id)
            .await
            .map_err(storage_err)
    }

    async fn select_order_fees(&self, order_id: &str) -> OrderResult<Option<FeeSchedule>> {
        repo::find_fees(&self.pool, order_id)
            .await
            .map_err(storage_err)
    }

    async fn select_orders(&self, filter: &OrderFilter) -> OrderResult<Vec<Order>> {
        repo::find_all(&self.pool, filter).await.map_err(storage_err)
    }

    async fn update_order_fields(
        &self,
        id: &str,
        fields: &OrderFields,
        expected_status: OrderStatus,
        expected_updated_at: i64,
    ) -> OrderResult<bool> {
        repo::update_fields(&self.pool, id, fields, expected_status, expected_updated_at)
            .await
            .map_err(storage_err)
    }

    async fn delete_order(&self, id: &str) -> OrderResult<bool> {
        repo::delete(&self.pool, id).await.map_err(storage_err)
    }

    async fn delete_all_orders(&self) -> OrderResult<u64> {
        repo::delete_all(&self.pool).await.map_err(storage_err)
    }

    async fn count_orders(&self) -> OrderResult<i64> {
        repo::count(&self.pool).await.map_err(storage_err)
    }

    async fn count_orders_by_status(&self, status: OrderStatus) -> OrderResult<i64> {
        repo::count_by_status(&self.pool, status)
            .await
            .map_err(storage_err)
    }

    async fn sum_revenue(&self) -> OrderResult<f64> {
        repo::sum_total(&self.pool).await.map_err(storage_err)
    }

    async fn aggregate_top_items(&self, limit: i64) -> OrderResult<Vec<TopSellingItem>> {
        repo::top_items(&self.pool, limit)
            .await
            .map_err(storage_err)
    }

    async fn select_recent_orders(&self, limit: i64) -> OrderResult<Vec<RecentOrder>> {
        repo::recent(&self.pool, limit).await.map_err(storage_err)
    }

    async fn ping(&self) -> OrderResult<()> {
        repo::ping(&self.pool).await.map_err(storage_err)
    }
}
