//! Order Repository

use super::{RepoError, RepoResult};
use shared::order::{
    Order, OrderFilter, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, RecentOrder,
    TopSellingItem,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::billing::FeeSchedule;
use crate::billing::calculator::{to_decimal, to_f64};
use crate::orders::store::OrderFields;

/// Order ids bound per item query (SQLite caps bound parameters)
const ITEM_QUERY_CHUNK: usize = 500;

const ORDER_COLUMNS: &str = "id, order_number, user_id, restaurant_id, restaurant_name, total, \
     status, payment_method, payment_status, delivery_address, customer_name, customer_phone, \
     customer_email, estimated_time, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: Option<String>,
    restaurant_id: Option<String>,
    restaurant_name: String,
    total: f64,
    status: String,
    payment_method: String,
    payment_status: String,
    delivery_address: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    estimated_time: Option<String>,
    notes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> RepoResult<Order> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| RepoError::Validation(format!("order {}: {}", self.id, e)))?;
        let payment_method: PaymentMethod = self
            .payment_method
            .parse()
            .map_err(|e| RepoError::Validation(format!("order {}: {}", self.id, e)))?;
        let payment_status: PaymentStatus = self
            .payment_status
            .parse()
            .map_err(|e| RepoError::Validation(format!("order {}: {}", self.id, e)))?;
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            restaurant_id: self.restaurant_id,
            restaurant_name: self.restaurant_name,
            items,
            total: self.total,
            status,
            payment_method,
            payment_status,
            delivery_address: self.delivery_address,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_email: self.customer_email,
            estimated_time: self.estimated_time,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: String,
    item_id: String,
    name: String,
    price: f64,
    quantity: i64,
    image: Option<String>,
}

impl From<ItemRow> for OrderItem {
    fn from(row: ItemRow) -> Self {
        OrderItem {
            item_id: row.item_id,
            name: row.name,
            price: row.price,
            quantity: i32::try_from(row.quantity).unwrap_or(i32::MAX),
            image: row.image,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TopItemRow {
    id: String,
    name: String,
    quantity: i64,
    revenue: f64,
}

#[derive(sqlx::FromRow)]
struct FeeRow {
    delivery_fee: Option<f64>,
    platform_fee: Option<f64>,
    tax_rate_percent: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct RecentRow {
    id: String,
    order_number: String,
    total: f64,
    status: String,
    created_at: i64,
}

/// Advance the order-number counter (single-row `UPDATE … RETURNING`)
pub async fn next_sequence(pool: &SqlitePool) -> RepoResult<i64> {
    let value = sqlx::query_scalar::<_, i64>(
        "UPDATE order_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
    )
    .fetch_one(pool)
    .await?;
    Ok(value)
}

/// Insert header, fee schedule and items atomically
pub async fn create(pool: &SqlitePool, order: &Order, fees: &FeeSchedule) -> RepoResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, restaurant_id, restaurant_name, total, \
         status, payment_method, payment_status, delivery_address, customer_name, customer_phone, \
         customer_email, estimated_time, notes, created_at, updated_at, \
         delivery_fee, platform_fee, tax_rate_percent) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(&order.restaurant_id)
    .bind(&order.restaurant_name)
    .bind(order.total)
    .bind(order.status.as_str())
    .bind(order.payment_method.as_str())
    .bind(order.payment_status.as_str())
    .bind(&order.delivery_address)
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(&order.customer_email)
    .bind(&order.estimated_time)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(fees.delivery_fee)
    .bind(fees.platform_fee)
    .bind(fees.tax_rate_percent)
    .execute(&mut *tx)
    .await?;

    insert_order_items(&mut tx, &order.id, &order.items).await?;

    tx.commit().await?;
    Ok(())
}

/// Write the item snapshot rows of one order
pub async fn insert_order_items(
    conn: &mut SqliteConnection,
    order_id: &str,
    items: &[OrderItem],
) -> RepoResult<()> {
    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (order_id, position, item_id, name, price, quantity, image) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(position as i64)
        .bind(&item.item_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(item.quantity as i64)
        .bind(&item.image)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn find_items(pool: &SqlitePool, order_id: &str) -> RepoResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT order_id, item_id, name, price, quantity, image FROM order_items \
         WHERE order_id = ? ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// Fee schedule recorded at checkout
///
/// `None` when the order is missing or predates fee recording.
pub async fn find_fees(pool: &SqlitePool, order_id: &str) -> RepoResult<Option<FeeSchedule>> {
    let row = sqlx::query_as::<_, FeeRow>(
        "SELECT delivery_fee, platform_fee, tax_rate_percent FROM orders WHERE id = ?",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|r| {
        Some(FeeSchedule {
            delivery_fee: r.delivery_fee?,
            platform_fee: r.platform_fee?,
            tax_rate_percent: r.tax_rate_percent?,
        })
    }))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> RepoResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    with_items(pool, row).await
}

pub async fn find_by_number(pool: &SqlitePool, order_number: &str) -> RepoResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await?;
    with_items(pool, row).await
}

async fn with_items(pool: &SqlitePool, row: Option<OrderRow>) -> RepoResult<Option<Order>> {
    match row {
        Some(row) => {
            let items = find_items(pool, &row.id).await?;
            Ok(Some(row.into_order(items)?))
        }
        None => Ok(None),
    }
}

/// Filtered list, newest first; items loaded in chunks of order ids
pub async fn find_all(pool: &SqlitePool, filter: &OrderFilter) -> RepoResult<Vec<Order>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1"));
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(restaurant_id) = &filter.restaurant_id {
        qb.push(" AND restaurant_id = ").push_bind(restaurant_id.clone());
    }
    if let Some(order_number) = &filter.order_number {
        qb.push(" AND order_number = ").push_bind(order_number.clone());
    }
    qb.push(" ORDER BY created_at DESC, seq DESC");

    let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut items_by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
    for chunk in rows.chunks(ITEM_QUERY_CHUNK) {
        let mut items_qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT order_id, item_id, name, price, quantity, image FROM order_items \
             WHERE order_id IN (",
        );
        let mut ids = items_qb.separated(", ");
        for row in chunk {
            ids.push_bind(row.id.clone());
        }
        items_qb.push(") ORDER BY order_id, position");
        let item_rows: Vec<ItemRow> = items_qb.build_query_as().fetch_all(pool).await?;

        for row in item_rows {
            items_by_order
                .entry(row.order_id.clone())
                .or_default()
                .push(OrderItem::from(row));
        }
    }

    rows.into_iter()
        .map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items)
        })
        .collect()
}

/// Compare-and-set update of the mutable columns
///
/// `updated_at` strictly increases on every write, so it doubles as the row
/// version.
pub async fn update_fields(
    pool: &SqlitePool,
    id: &str,
    fields: &OrderFields,
    expected_status: OrderStatus,
    expected_updated_at: i64,
) -> RepoResult<bool> {
    let result = sqlx::query(
        "UPDATE orders SET status = ?, payment_method = ?, payment_status = ?, \
         delivery_address = ?, customer_name = ?, customer_phone = ?, customer_email = ?, \
         estimated_time = ?, notes = ?, updated_at = ? \
         WHERE id = ? AND status = ? AND updated_at = ?",
    )
    .bind(fields.status.as_str())
    .bind(fields.payment_method.as_str())
    .bind(fields.payment_status.as_str())
    .bind(&fields.delivery_address)
    .bind(&fields.customer_name)
    .bind(&fields.customer_phone)
    .bind(&fields.customer_email)
    .bind(&fields.estimated_time)
    .bind(&fields.notes)
    .bind(fields.updated_at)
    .bind(id)
    .bind(expected_status.as_str())
    .bind(expected_updated_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Items go with the header via `ON DELETE CASCADE`
pub async fn delete(pool: &SqlitePool, id: &str) -> RepoResult<bool> {
    let result = sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all(pool: &SqlitePool) -> RepoResult<u64> {
    let result = sqlx::query("DELETE FROM orders").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &SqlitePool) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_by_status(pool: &SqlitePool, status: OrderStatus) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn sum_total(pool: &SqlitePool) -> RepoResult<f64> {
    let sum = sqlx::query_scalar::<_, f64>(
        "SELECT CAST(COALESCE(SUM(total), 0) AS REAL) FROM orders",
    )
    .fetch_one(pool)
    .await?;
    Ok(sum)
}

/// Best sellers across all line items
///
/// Grouped by item id; the name shown is the lexically smallest one recorded
/// for that id.
pub async fn top_items(pool: &SqlitePool, limit: i64) -> RepoResult<Vec<TopSellingItem>> {
    let rows = sqlx::query_as::<_, TopItemRow>(
        "SELECT item_id AS id, MIN(name) AS name, SUM(quantity) AS quantity, \
         CAST(SUM(price * quantity) AS REAL) AS revenue \
         FROM order_items GROUP BY item_id \
         ORDER BY SUM(quantity) DESC, item_id ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| TopSellingItem {
            id: r.id,
            name: r.name,
            quantity: r.quantity,
            revenue: to_f64(to_decimal(r.revenue)),
        })
        .collect())
}

pub async fn recent(pool: &SqlitePool, limit: i64) -> RepoResult<Vec<RecentOrder>> {
    let rows = sqlx::query_as::<_, RecentRow>(
        "SELECT id, order_number, total, status, created_at FROM orders \
         ORDER BY created_at DESC, seq DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|r| -> RepoResult<RecentOrder> {
            let status: OrderStatus = r
                .status
                .parse()
                .map_err(|e| RepoError::Validation(format!("order {}: {}", r.id, e)))?;
            Ok(RecentOrder {
                id: r.id,
                order_number: r.order_number,
                total: r.total,
                status,
                ordered_at: r.created_at,
            })
        })
        .collect()
}

pub async fn ping(pool: &SqlitePool) -> RepoResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
