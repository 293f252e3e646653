//! OrderManager - order creation, lookup, updates and dashboard stats
//!
//! # Create Flow
//!
//! ```text
//! create(draft)
//!     ├─ 1. Validate draft (required fields, line items, text lengths)
//!     ├─ 2. Compute breakdown server-side, check client total
//!     ├─ 3. Assign id (client or ord_<uuid>)
//!     ├─ 4. Assign order number (client token or ORD + store sequence)
//!     ├─ 5. Insert header + fee schedule + item snapshot (one transaction)
//!     ├─ 6. Retry with a fresh sequence value on number collision
//!     ├─ 7. Populate cache
//!     └─ 8. Fire receipt notifier (optional, not awaited)
//! ```
//!
//! Every write is a compare-and-set on the stored status and `updated_at`, so
//! two concurrent writers from the same snapshot cannot both win.

use super::cache::OrderCache;
use super::error::{OrderError, OrderResult};
use super::lifecycle;
use super::notifier::ReceiptNotifier;
use super::store::{OrderFields, OrderStore};
use crate::billing::BillingCalculator;
use crate::billing::calculator::{to_decimal, to_f64};
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::order::{
    BillLine, Breakdown, ForceStatusRequest, Invoice, Order, OrderDraft, OrderFilter, OrderPatch,
    OrderStats, OrderStatus,
};
use shared::util::{format_order_number, new_order_id, now_millis};
use std::sync::Arc;
use std::time::Duration;

/// Generated order numbers that collide are retried this many times
pub const MAX_ORDER_NUMBER_RETRIES: usize = 5;

/// Compare-and-set attempts before giving up on a contended order
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Dashboard list sizes
const TOP_ITEMS_LIMIT: i64 = 5;
const RECENT_ORDERS_LIMIT: i64 = 5;

/// Upper bound for free-text fields and client tokens
const MAX_TEXT_LEN: usize = 500;
const MAX_TOKEN_LEN: usize = 64;

pub struct OrderManager {
    store: Arc<dyn OrderStore>,
    calculator: BillingCalculator,
    cache: OrderCache,
    notifier: Option<Arc<dyn ReceiptNotifier>>,
    /// Send a receipt right after checkout
    receipt_on_create: bool,
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager")
            .field("store", &"<dyn OrderStore>")
            .field("calculator", &self.calculator)
            .field("cache_entries", &self.cache.len())
            .field("receipt_on_create", &self.receipt_on_create)
            .finish()
    }
}

impl OrderManager {
    /// Manager without cache or notifier
    pub fn new(store: Arc<dyn OrderStore>, calculator: BillingCalculator) -> Self {
        Self {
            store,
            calculator,
            cache: OrderCache::disabled(),
            notifier: None,
            receipt_on_create: false,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = OrderCache::new(ttl);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReceiptNotifier>, on_create: bool) -> Self {
        self.notifier = Some(notifier);
        self.receipt_on_create = on_create;
        self
    }

    pub fn calculator(&self) -> &BillingCalculator {
        &self.calculator
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    // ========================================================================
    // Billing
    // ========================================================================

    /// Pre-order cart breakdown
    pub fn quote(&self, lines: &[BillLine]) -> OrderResult<Breakdown> {
        self.calculator.compute(lines)
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create(&self, draft: OrderDraft) -> OrderResult<Order> {
        validate_draft(&draft)?;

        let breakdown = self.calculator.compute_for_order(&draft.items)?;
        if let Some(client_total) = draft.total
            && !breakdown.matches_total(client_total)
        {
            return Err(OrderError::invalid_with(
                ErrorCode::OrderTotalMismatch,
                format!(
                    "total {} does not match computed total {}",
                    client_total, breakdown.total
                ),
            ));
        }

        let now = now_millis();
        let client_number = draft.order_number.clone();
        let mut order = Order {
            id: draft.id.unwrap_or_else(new_order_id),
            order_number: client_number.clone().unwrap_or_default(),
            user_id: draft.user_id,
            restaurant_id: draft.restaurant_id,
            restaurant_name: draft.restaurant_name.trim().to_string(),
            items: draft.items,
            total: breakdown.total,
            status: OrderStatus::initial(),
            payment_method: draft.payment_method.unwrap_or_default(),
            payment_status: draft.payment_status.unwrap_or_default(),
            delivery_address: draft.delivery_address,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_email: draft.customer_email,
            estimated_time: draft.estimated_time,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        };

        match client_number {
            // 客户端提供的单号：冲突直接返回，不重试
            Some(_) => {
                self.store
                    .insert_order(&order, self.calculator.fees())
                    .await?
            }
            None => self.insert_with_generated_number(&mut order).await?,
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total,
            items = order.items.len(),
            "Order created"
        );

        self.cache.put(&order);
        if self.receipt_on_create {
            self.spawn_receipt(order.id.clone());
        }
        Ok(order)
    }

    async fn insert_with_generated_number(&self, order: &mut Order) -> OrderResult<()> {
        let mut attempt = 0;
        loop {
            let seq = self.store.next_order_sequence().await?;
            order.order_number = format_order_number(seq);
            match self.store.insert_order(order, self.calculator.fees()).await {
                Ok(()) => return Ok(()),
                Err(OrderError::DuplicateOrderNumber(number))
                    if attempt + 1 < MAX_ORDER_NUMBER_RETRIES =>
                {
                    attempt += 1;
                    tracing::warn!(
                        order_number = %number,
                        attempt,
                        "Generated order number already taken, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Resolve by id first, then by order number
    ///
    /// A cached number alias is only trusted once the store has confirmed that
    /// no order uses `key` as its id.
    pub async fn get_by_id_or_number(&self, key: &str) -> OrderResult<Option<Order>> {
        if let Some(order) = self.cache.get_by_id(key) {
            return Ok(Some(order));
        }
        let order = match self.store.select_order_by_id(key).await? {
            Some(order) => Some(order),
            None => {
                if let Some(order) = self.cache.get_by_number(key) {
                    return Ok(Some(order));
                }
                self.store.select_order_by_number(key).await?
            }
        };
        if let Some(order) = &order {
            self.cache.put(order);
        }
        Ok(order)
    }

    /// Uncached resolution
    async fn load(&self, key: &str) -> OrderResult<Option<Order>> {
        if let Some(order) = self.store.select_order_by_id(key).await? {
            return Ok(Some(order));
        }
        self.store.select_order_by_number(key).await
    }

    /// Filtered list, newest first (not cached)
    pub async fn list(&self, filter: &OrderFilter) -> OrderResult<Vec<Order>> {
        self.store.select_orders(filter).await
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Apply the whitelisted fields of `patch`
    ///
    /// A status in the patch must be a legal transition from the current one
    /// (or equal to it). An empty patch returns the order unchanged.
    pub async fn update_by_id_or_number(
        &self,
        key: &str,
        patch: &OrderPatch,
    ) -> OrderResult<Option<Order>> {
        validate_patch(patch)?;
        let changed = self
            .write_with(key, |current| {
                let status = lifecycle::check_patch_status(current.status, patch.status)?;
                if patch.is_empty() {
                    return Ok(None);
                }
                let mut next = current.clone();
                patch.apply_to(&mut next);
                next.status = status.unwrap_or(current.status);
                next.updated_at = now_millis().max(current.updated_at + 1);
                Ok(Some(next))
            })
            .await?;

        Ok(changed.map(|(before, after)| {
            if before.status != after.status {
                tracing::info!(
                    order_number = %after.order_number,
                    from = %before.status,
                    to = %after.status,
                    "Order status changed"
                );
            }
            after
        }))
    }

    /// Lifecycle step through the state machine
    pub async fn transition(&self, key: &str, to: OrderStatus) -> OrderResult<Option<Order>> {
        let changed = self
            .write_with(key, |current| lifecycle::apply(current, to).map(Some))
            .await?;
        Ok(changed.map(|(before, after)| {
            tracing::info!(
                order_number = %after.order_number,
                from = %before.status,
                to = %after.status,
                "Order status changed"
            );
            after
        }))
    }

    /// Admin correction that bypasses the lifecycle rules
    ///
    /// Requires a non-empty reason; every override is written to the `audit`
    /// log target.
    pub async fn force_status(
        &self,
        key: &str,
        request: &ForceStatusRequest,
    ) -> OrderResult<Option<Order>> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(OrderError::invalid_with(
                ErrorCode::OrderOverrideReasonRequired,
                "reason is required to force an order status",
            ));
        }
        check_text("reason", Some(reason))?;

        let to = request.status;
        let changed = self
            .write_with(key, |current| Ok(Some(lifecycle::force(current, to))))
            .await?;

        Ok(changed.map(|(before, after)| {
            tracing::warn!(
                target: "audit",
                order_id = %after.id,
                order_number = %after.order_number,
                from = %before.status,
                to = %after.status,
                actor = request.actor.as_deref().unwrap_or("unknown"),
                reason = %reason,
                "Order status forced"
            );
            after
        }))
    }

    /// Resolve `key`, let `change` derive the next snapshot and store it with a
    /// compare-and-set against the snapshot read
    ///
    /// `change` returning `Ok(None)` means nothing to write; the current order
    /// is returned as both halves of the pair.
    async fn write_with<F>(&self, key: &str, change: F) -> OrderResult<Option<(Order, Order)>>
    where
        F: Fn(&Order) -> OrderResult<Option<Order>> + Send + Sync,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(current) = self.load(key).await? else {
                self.cache.invalidate(key);
                return Ok(None);
            };
            let Some(next) = change(&current)? else {
                self.cache.put(&current);
                return Ok(Some((current.clone(), current)));
            };

            let written = self
                .store
                .update_order_fields(
                    &current.id,
                    &OrderFields::from(&next),
                    current.status,
                    current.updated_at,
                )
                .await?;
            self.cache.invalidate(&current.id);
            if written {
                return Ok(Some((current, next)));
            }
            tracing::debug!(order_id = %current.id, "Order changed concurrently, re-reading");
        }
        Err(OrderError::StorageUnavailable(format!(
            "order {} kept changing during update",
            key
        )))
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete one order and its item snapshot
    ///
    /// Idempotent: returns `false` when nothing matched.
    pub async fn remove(&self, id: &str) -> OrderResult<bool> {
        let deleted = self.store.delete_order(id).await?;
        self.cache.invalidate(id);
        if deleted {
            tracing::info!(order_id = %id, "Order deleted");
        }
        Ok(deleted)
    }

    /// Delete every order. Irreversible.
    pub async fn clear_all(&self) -> OrderResult<u64> {
        let deleted = self.store.delete_all_orders().await?;
        self.cache.clear();
        tracing::warn!(target: "audit", deleted, "All orders cleared");
        Ok(deleted)
    }

    // ========================================================================
    // Invoice / receipt
    // ========================================================================

    /// Invoice rebuilt from the persisted item snapshot and the fee schedule
    /// recorded at checkout
    ///
    /// Orders without a recorded schedule are billed with the current one.
    pub async fn invoice(&self, key: &str) -> OrderResult<Option<Invoice>> {
        let Some(mut order) = self.get_by_id_or_number(key).await? else {
            return Ok(None);
        };
        order.items = self.store.select_order_items(&order.id).await?;
        let calculator = match self.store.select_order_fees(&order.id).await? {
            Some(fees) => BillingCalculator::new(fees)?,
            None => self.calculator,
        };
        let breakdown = calculator.compute_for_order(&order.items)?;
        if !breakdown.matches_total(order.total) {
            tracing::warn!(
                order_number = %order.order_number,
                stored = order.total,
                computed = breakdown.total,
                "Invoice total differs from stored order total"
            );
        }
        Ok(Some(Invoice::new(&order, breakdown)))
    }

    /// Queue a receipt; returns the order id or `None` when not found
    pub async fn send_receipt(&self, key: &str) -> OrderResult<Option<String>> {
        let Some(order) = self.get_by_id_or_number(key).await? else {
            return Ok(None);
        };
        self.spawn_receipt(order.id.clone());
        Ok(Some(order.id))
    }

    fn spawn_receipt(&self, order_id: String) {
        let Some(notifier) = self.notifier.clone() else {
            tracing::debug!(order_id = %order_id, "No receipt notifier configured");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.send_receipt(&order_id).await {
                tracing::warn!(order_id = %order_id, error = %e, "Failed to send receipt");
            }
        });
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub async fn stats(&self) -> OrderResult<OrderStats> {
        let (total_orders, revenue, pending_orders, completed_orders, top_selling_items, recent_orders) =
            tokio::try_join!(
                self.store.count_orders(),
                self.store.sum_revenue(),
                self.store.count_orders_by_status(OrderStatus::Pending),
                self.store.count_orders_by_status(OrderStatus::Delivered),
                self.store.aggregate_top_items(TOP_ITEMS_LIMIT),
                self.store.select_recent_orders(RECENT_ORDERS_LIMIT),
            )?;

        let revenue = to_decimal(revenue);
        let average_order_value = if total_orders > 0 {
            to_f64(revenue / Decimal::from(total_orders))
        } else {
            0.0
        };

        Ok(OrderStats {
            total_orders,
            total_revenue: to_f64(revenue),
            pending_orders,
            completed_orders,
            average_order_value,
            top_selling_items,
            recent_orders,
        })
    }

    /// Storage reachability, for health checks
    pub async fn ping(&self) -> OrderResult<()> {
        self.store.ping().await
    }
}

// ============================================================================
// Boundary validation
// ============================================================================

fn validate_draft(draft: &OrderDraft) -> OrderResult<()> {
    if draft.restaurant_name.trim().is_empty() {
        return Err(OrderError::invalid_with(
            ErrorCode::RequiredField,
            "restaurantName is required",
        ));
    }
    if draft.items.is_empty() {
        return Err(OrderError::invalid_with(
            ErrorCode::OrderEmpty,
            "order must contain at least one item",
        ));
    }
    for item in &draft.items {
        if item.item_id.trim().is_empty() || item.name.trim().is_empty() {
            return Err(OrderError::invalid_with(
                ErrorCode::RequiredField,
                "every item needs an itemId and a name",
            ));
        }
        check_text("item name", Some(&item.name))?;
    }
    check_token("id", draft.id.as_deref())?;
    check_token("orderNumber", draft.order_number.as_deref())?;
    check_text("restaurantName", Some(&draft.restaurant_name))?;
    check_text("deliveryAddress", draft.delivery_address.as_deref())?;
    check_text("customerName", draft.customer_name.as_deref())?;
    check_text("customerPhone", draft.customer_phone.as_deref())?;
    check_text("customerEmail", draft.customer_email.as_deref())?;
    check_text("estimatedTime", draft.estimated_time.as_deref())?;
    check_text("notes", draft.notes.as_deref())?;
    Ok(())
}

fn validate_patch(patch: &OrderPatch) -> OrderResult<()> {
    for (field, value) in patch.text_fields() {
        check_text(field, value)?;
    }
    Ok(())
}

fn check_text(field: &str, value: Option<&str>) -> OrderResult<()> {
    match value {
        Some(v) if v.chars().count() > MAX_TEXT_LEN => Err(OrderError::invalid_with(
            ErrorCode::ValueOutOfRange,
            format!("{} must be at most {} characters", field, MAX_TEXT_LEN),
        )),
        _ => Ok(()),
    }
}

/// Client-supplied identifiers: non-blank, bounded, no whitespace
fn check_token(field: &str, value: Option<&str>) -> OrderResult<()> {
    let Some(v) = value else {
        return Ok(());
    };
    if v.is_empty() || v.len() > MAX_TOKEN_LEN || v.chars().any(char::is_whitespace) {
        return Err(OrderError::invalid_with(
            ErrorCode::InvalidFormat,
            format!(
                "{} must be 1-{} characters without whitespace",
                field, MAX_TOKEN_LEN
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::FeeSchedule;
    use crate::db::{DbService, SqliteOrderStore};
    use async_trait::async_trait;
    use shared::order::{OrderItem, PaymentMethod, PaymentStatus, RecentOrder, TopSellingItem};
    use shared::util::ORDER_ID_PREFIX;
    use std::sync::Mutex;

    async fn sqlite_store() -> Arc<SqliteOrderStore> {
        let db = DbService::open_in_memory().await.unwrap();
        Arc::new(SqliteOrderStore::new(db.pool))
    }

    async fn manager() -> OrderManager {
        OrderManager::new(sqlite_store().await, BillingCalculator::default())
            .with_cache_ttl(Duration::from_secs(30))
    }

    /// No fees: total equals subtotal
    async fn flat_manager() -> OrderManager {
        let calc = BillingCalculator::new(FeeSchedule::ZERO).unwrap();
        OrderManager::new(sqlite_store().await, calc)
    }

    fn draft(items: Vec<OrderItem>) -> OrderDraft {
        OrderDraft {
            restaurant_id: Some("r1".into()),
            restaurant_name: "Saravana Bhavan".into(),
            items,
            customer_name: Some("Ravi".into()),
            ..Default::default()
        }
    }

    fn one_item(price: f64) -> Vec<OrderItem> {
        vec![OrderItem::new("i1", "Thali", price, 1)]
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_defaults() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(100.0))).await.unwrap();

        assert!(order.id.starts_with(ORDER_ID_PREFIX));
        assert_eq!(order.order_number, "ORD000001");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_method, PaymentMethod::Cash);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.total, 152.0);
        assert_eq!(order.created_at, order.updated_at);

        let second = mgr.create(draft(one_item(100.0))).await.unwrap();
        assert_eq!(second.order_number, "ORD000002");
    }

    #[tokio::test]
    async fn test_create_keeps_client_identity() {
        let mgr = manager().await;
        let mut d = draft(one_item(100.0));
        d.id = Some("ord_client".into());
        d.order_number = Some("WEB-7f3a".into());
        d.payment_method = Some(PaymentMethod::Upi);
        let order = mgr.create(d).await.unwrap();
        assert_eq!(order.id, "ord_client");
        assert_eq!(order.order_number, "WEB-7f3a");
        assert_eq!(order.payment_method, PaymentMethod::Upi);
    }

    #[tokio::test]
    async fn test_client_number_collision_is_reported() {
        let mgr = manager().await;
        let mut d = draft(one_item(100.0));
        d.order_number = Some("WEB-1".into());
        mgr.create(d.clone()).await.unwrap();
        let err = mgr.create(d).await.unwrap_err();
        assert!(matches!(err, OrderError::DuplicateOrderNumber(n) if n == "WEB-1"));
    }

    #[tokio::test]
    async fn test_generated_number_skips_taken_tokens() {
        let mgr = manager().await;
        let mut d = draft(one_item(100.0));
        d.order_number = Some("ORD000001".into());
        mgr.create(d).await.unwrap();

        // sequence yields 1 first, which is taken by the client token
        let order = mgr.create(draft(one_item(100.0))).await.unwrap();
        assert_eq!(order.order_number, "ORD000002");
    }

    #[tokio::test]
    async fn test_client_total_checked() {
        let mgr = manager().await;
        let mut d = draft(one_item(100.0));
        d.total = Some(152.0);
        assert_eq!(mgr.create(d).await.unwrap().total, 152.0);

        let mut d = draft(one_item(100.0));
        d.total = Some(145.0);
        let err = mgr.create(d).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidInput(ErrorCode::OrderTotalMismatch, _)
        ));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let mgr = manager().await;
        let cases: Vec<(OrderDraft, ErrorCode)> = vec![
            (draft(Vec::new()), ErrorCode::OrderEmpty),
            (
                OrderDraft {
                    restaurant_name: "  ".into(),
                    ..draft(one_item(10.0))
                },
                ErrorCode::RequiredField,
            ),
            (
                draft(vec![OrderItem::new("i1", "Thali", 10.0, 0)]),
                ErrorCode::InvalidQuantity,
            ),
            (
                draft(vec![OrderItem::new("i1", "Thali", -5.0, 1)]),
                ErrorCode::InvalidPrice,
            ),
            (
                OrderDraft {
                    notes: Some("x".repeat(MAX_TEXT_LEN + 1)),
                    ..draft(one_item(10.0))
                },
                ErrorCode::ValueOutOfRange,
            ),
            (
                OrderDraft {
                    order_number: Some("has space".into()),
                    ..draft(one_item(10.0))
                },
                ErrorCode::InvalidFormat,
            ),
        ];
        for (d, expected) in cases {
            match mgr.create(d).await {
                Err(OrderError::InvalidInput(code, _)) => assert_eq!(code, expected),
                other => panic!("expected {:?}, got {:?}", expected, other),
            }
        }
        assert_eq!(mgr.store().count_orders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lookup_symmetry() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();

        let by_id = mgr.get_by_id_or_number(&order.id).await.unwrap();
        let by_number = mgr.get_by_id_or_number(&order.order_number).await.unwrap();
        assert_eq!(by_id, by_number);
        assert_eq!(by_id, Some(order));
        assert_eq!(mgr.get_by_id_or_number("ORD999999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_id_wins_over_cached_number() {
        let mgr = manager().await;
        let mut d = draft(one_item(80.0));
        d.id = Some("ORD000001".into());
        d.order_number = Some("WEB-1".into());
        let by_id = mgr.create(d).await.unwrap();

        // generated number equals the other order's id
        let by_number = mgr.create(draft(one_item(90.0))).await.unwrap();
        assert_eq!(by_number.order_number, "ORD000001");

        // drop the first order from the cache, keep the second one cached
        let patch = OrderPatch {
            notes: Some(Some("ring twice".into())),
            ..Default::default()
        };
        mgr.update_by_id_or_number("WEB-1", &patch).await.unwrap();
        mgr.get_by_id_or_number(&by_number.id).await.unwrap();

        let found = mgr.get_by_id_or_number("ORD000001").await.unwrap().unwrap();
        assert_eq!(found.id, by_id.id);
        assert_eq!(found.notes.as_deref(), Some("ring twice"));
    }

    #[tokio::test]
    async fn test_update_whitelisted_fields() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();

        let patch = OrderPatch {
            payment_status: Some(PaymentStatus::Completed),
            notes: Some(Some("leave at door".into())),
            ..Default::default()
        };
        let updated = mgr
            .update_by_id_or_number(&order.order_number, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Completed);
        assert_eq!(updated.notes.as_deref(), Some("leave at door"));
        assert_eq!(updated.total, order.total);
        assert_eq!(updated.created_at, order.created_at);
        assert!(updated.updated_at > order.updated_at);

        // cache was invalidated: fresh read sees the change
        let reread = mgr.get_by_id_or_number(&order.id).await.unwrap().unwrap();
        assert_eq!(reread, updated);
    }

    #[tokio::test]
    async fn test_update_clears_text_field() {
        let mgr = manager().await;
        let mut d = draft(one_item(80.0));
        d.notes = Some("no cutlery".into());
        d.estimated_time = Some("40 min".into());
        let order = mgr.create(d).await.unwrap();

        let patch: OrderPatch = serde_json::from_str(r#"{"notes":null}"#).unwrap();
        let updated = mgr
            .update_by_id_or_number(&order.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.notes.is_none());
        assert_eq!(updated.estimated_time.as_deref(), Some("40 min"));

        let reread = mgr.get_by_id_or_number(&order.id).await.unwrap().unwrap();
        assert!(reread.notes.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_order_is_none() {
        let mgr = manager().await;
        let patch = OrderPatch {
            notes: Some(Some("hi".into())),
            ..Default::default()
        };
        assert!(
            mgr.update_by_id_or_number("nope", &patch)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_empty_patch_returns_order_unchanged() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        let same = mgr
            .update_by_id_or_number(&order.id, &OrderPatch::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same, order);
    }

    #[tokio::test]
    async fn test_update_status_enforces_lifecycle() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();

        let skip = OrderPatch {
            status: Some(OrderStatus::Delivered),
            ..Default::default()
        };
        let err = mgr
            .update_by_id_or_number(&order.id, &skip)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        // re-sending the current status is a no-op, other fields still apply
        let same = OrderPatch {
            status: Some(OrderStatus::Pending),
            customer_phone: Some(Some("+91 98765 43210".into())),
            ..Default::default()
        };
        let updated = mgr
            .update_by_id_or_number(&order.id, &same)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Pending);
        assert_eq!(updated.customer_phone.as_deref(), Some("+91 98765 43210"));

        let step = OrderPatch {
            status: Some(OrderStatus::Confirmed),
            ..Default::default()
        };
        let updated = mgr
            .update_by_id_or_number(&order.id, &step)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_transition_walks_forward_path() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();

        for to in OrderStatus::FORWARD.into_iter().skip(1) {
            let next = mgr.transition(&order.id, to).await.unwrap().unwrap();
            assert_eq!(next.status, to);
        }
        let err = mgr
            .transition(&order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled
            }
        ));
        assert!(
            mgr.transition("missing", OrderStatus::Confirmed)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_concurrent_transitions_single_winner() {
        let mgr = Arc::new(manager().await);
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();

        let a = {
            let mgr = mgr.clone();
            let id = order.id.clone();
            tokio::spawn(async move { mgr.transition(&id, OrderStatus::Confirmed).await })
        };
        let b = {
            let mgr = mgr.clone();
            let id = order.id.clone();
            tokio::spawn(async move { mgr.transition(&id, OrderStatus::Cancelled).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // both may succeed only in a legal sequence (confirm then cancel)
        let final_status = mgr
            .get_by_id_or_number(&order.id)
            .await
            .unwrap()
            .unwrap()
            .status;
        match (a.is_ok(), b.is_ok()) {
            (true, true) => assert_eq!(final_status, OrderStatus::Cancelled),
            (false, true) => assert_eq!(final_status, OrderStatus::Cancelled),
            (true, false) => assert_eq!(final_status, OrderStatus::Confirmed),
            (false, false) => panic!("at least one transition must succeed"),
        }
    }

    #[tokio::test]
    async fn test_force_status_requires_reason() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        mgr.transition(&order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let no_reason = ForceStatusRequest {
            status: OrderStatus::Pending,
            reason: "   ".into(),
            actor: None,
        };
        let err = mgr.force_status(&order.id, &no_reason).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidInput(ErrorCode::OrderOverrideReasonRequired, _)
        ));

        let req = ForceStatusRequest {
            status: OrderStatus::Pending,
            reason: "cancelled by mistake".into(),
            actor: Some("admin@example.com".into()),
        };
        let reopened = mgr.force_status(&order.id, &req).await.unwrap().unwrap();
        assert_eq!(reopened.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        // warm the cache
        mgr.get_by_id_or_number(&order.order_number).await.unwrap();

        assert!(mgr.remove(&order.id).await.unwrap());
        assert!(!mgr.remove(&order.id).await.unwrap());
        assert!(mgr.get_by_id_or_number(&order.id).await.unwrap().is_none());
        assert!(
            mgr.get_by_id_or_number(&order.order_number)
                .await
                .unwrap()
                .is_none()
        );
        assert!(mgr.store().select_order_items(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let mgr = manager().await;
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        mgr.create(draft(one_item(90.0))).await.unwrap();
        assert_eq!(mgr.clear_all().await.unwrap(), 2);
        assert!(mgr.get_by_id_or_number(&order.id).await.unwrap().is_none());
        assert!(mgr.list(&OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let mgr = manager().await;
        let first = mgr.create(draft(one_item(80.0))).await.unwrap();
        let mut d = draft(one_item(90.0));
        d.user_id = Some("u42".into());
        let second = mgr.create(d).await.unwrap();
        mgr.transition(&second.id, OrderStatus::Confirmed)
            .await
            .unwrap();

        let all = mgr.list(&OrderFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = mgr
            .list(&OrderFilter {
                user_id: Some("u42".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, second.id);

        let pending = mgr
            .list(&OrderFilter {
                status: Some(OrderStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }

    #[tokio::test]
    async fn test_stats_consistency() {
        let mgr = flat_manager().await;
        let mut ids = Vec::new();
        for price in [100.0, 200.0, 300.0] {
            ids.push(mgr.create(draft(one_item(price))).await.unwrap().id);
        }
        for to in OrderStatus::FORWARD.into_iter().skip(1) {
            mgr.transition(&ids[2], to).await.unwrap();
        }

        let stats = mgr.stats().await.unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.pending_orders, 2);
        assert_eq!(stats.completed_orders, 1);
        assert_eq!(stats.total_revenue, 600.0);
        assert_eq!(stats.average_order_value, 200.0);
        assert_eq!(stats.top_selling_items.len(), 1);
        assert_eq!(stats.top_selling_items[0].quantity, 3);
        assert_eq!(stats.top_selling_items[0].revenue, 600.0);
        assert_eq!(stats.recent_orders.len(), 3);
        assert_eq!(stats.recent_orders[0].id, ids[2]);
    }

    #[tokio::test]
    async fn test_stats_top_items_tie_break_and_limit() {
        let mgr = flat_manager().await;
        let items: Vec<OrderItem> = ["i7", "i3", "i5", "i1", "i6", "i2"]
            .iter()
            .map(|id| OrderItem::new(*id, format!("Item {}", id), 10.0, 2))
            .collect();
        mgr.create(draft(items)).await.unwrap();
        mgr.create(draft(vec![OrderItem::new("i6", "Item i6", 10.0, 1)]))
            .await
            .unwrap();

        let stats = mgr.stats().await.unwrap();
        let ids: Vec<_> = stats
            .top_selling_items
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["i6", "i1", "i2", "i3", "i5"]);
    }

    #[tokio::test]
    async fn test_stats_empty() {
        let mgr = manager().await;
        let stats = mgr.stats().await.unwrap();
        assert_eq!(stats, OrderStats::default());
    }

    #[tokio::test]
    async fn test_invoice_matches_created_total() {
        let mgr = manager().await;
        let items = vec![
            OrderItem::new("i1", "Butter Chicken", 320.0, 1),
            OrderItem::new("i2", "Garlic Naan", 45.0, 3),
        ];
        let order = mgr.create(draft(items.clone())).await.unwrap();

        let invoice = mgr.invoice(&order.order_number).await.unwrap().unwrap();
        assert_eq!(invoice.breakdown.total, order.total);
        assert_eq!(invoice.breakdown.subtotal, 455.0);
        assert_eq!(invoice.items, items);
        assert_eq!(invoice.order_number, order.order_number);
        assert!(mgr.invoice("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invoice_uses_fees_charged_at_checkout() {
        let store = sqlite_store().await;
        let before = OrderManager::new(store.clone(), BillingCalculator::default());
        let order = before.create(draft(one_item(100.0))).await.unwrap();
        assert_eq!(order.total, 152.0);

        // operator raises the delivery fee and restarts
        let fees = FeeSchedule {
            delivery_fee: 60.0,
            ..FeeSchedule::default()
        };
        let after = OrderManager::new(store, BillingCalculator::new(fees).unwrap());
        let invoice = after.invoice(&order.order_number).await.unwrap().unwrap();
        assert_eq!(invoice.breakdown.delivery_fee, 40.0);
        assert_eq!(invoice.breakdown.taxes, 7.0);
        assert_eq!(invoice.breakdown.total, order.total);

        // new orders pick up the new schedule
        let fresh = after.create(draft(one_item(100.0))).await.unwrap();
        assert_eq!(fresh.total, 173.0);
        let fresh_invoice = after.invoice(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_invoice.breakdown.delivery_fee, 60.0);
    }

    #[tokio::test]
    async fn test_historical_price_immutability() {
        let mgr = manager().await;
        let mut menu_price = 120.0;
        let order = mgr
            .create(draft(vec![OrderItem::new("i1", "Dal Makhani", menu_price, 2)]))
            .await
            .unwrap();
        let before = mgr.invoice(&order.id).await.unwrap().unwrap();

        // menu changes after checkout; nothing reads it back
        menu_price = 180.0;
        let after_order = mgr.get_by_id_or_number(&order.id).await.unwrap().unwrap();
        let after = mgr.invoice(&order.id).await.unwrap().unwrap();

        assert_ne!(after_order.items[0].price, menu_price);
        assert_eq!(after_order.items[0].price, 120.0);
        assert_eq!(after, before);
        assert_eq!(after.breakdown.total, order.total);
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReceiptNotifier for RecordingNotifier {
        async fn send_receipt(&self, order_id: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(order_id.to_string());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl ReceiptNotifier for FailingNotifier {
        async fn send_receipt(&self, _order_id: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    async fn wait_for(notifier: &RecordingNotifier, count: usize) {
        for _ in 0..100 {
            if notifier.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("receipt not delivered");
    }

    #[tokio::test]
    async fn test_receipt_on_create_and_on_demand() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mgr = OrderManager::new(sqlite_store().await, BillingCalculator::default())
            .with_notifier(notifier.clone(), true);

        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        wait_for(&notifier, 1).await;

        let queued = mgr.send_receipt(&order.order_number).await.unwrap();
        assert_eq!(queued.as_deref(), Some(order.id.as_str()));
        wait_for(&notifier, 2).await;
        assert_eq!(*notifier.sent.lock().unwrap(), vec![order.id.clone(), order.id]);

        assert!(mgr.send_receipt("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_affect_order() {
        let mgr = OrderManager::new(sqlite_store().await, BillingCalculator::default())
            .with_notifier(Arc::new(FailingNotifier), true);
        let order = mgr.create(draft(one_item(80.0))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(mgr.get_by_id_or_number(&order.id).await.unwrap().is_some());
    }

    /// Store whose backend is always down
    struct UnreachableStore;

    fn down<T>() -> OrderResult<T> {
        Err(OrderError::StorageUnavailable("connection refused".into()))
    }

    #[async_trait]
    impl OrderStore for UnreachableStore {
        async fn next_order_sequence(&self) -> OrderResult<i64> {
            down()
        }
        async fn insert_order(&self, _order: &Order, _fees: &FeeSchedule) -> OrderResult<()> {
            down()
        }
        async fn select_order_by_id(&self, _id: &str) -> OrderResult<Option<Order>> {
            down()
        }
        async fn select_order_by_number(&self, _n: &str) -> OrderResult<Option<Order>> {
            down()
        }
        async fn select_order_items(&self, _id: &str) -> OrderResult<Vec<OrderItem>> {
            down()
        }
        async fn select_order_fees(&self, _id: &str) -> OrderResult<Option<FeeSchedule>> {
            down()
        }
        async fn select_orders(&self, _f: &OrderFilter) -> OrderResult<Vec<Order>> {
            down()
        }
        async fn update_order_fields(
            &self,
            _id: &str,
            _fields: &OrderFields,
            _expected: OrderStatus,
            _expected_updated_at: i64,
        ) -> OrderResult<bool> {
            down()
        }
        async fn delete_order(&self, _id: &str) -> OrderResult<bool> {
            down()
        }
        async fn delete_all_orders(&self) -> OrderResult<u64> {
            down()
        }
        async fn count_orders(&self) -> OrderResult<i64> {
            down()
        }
        async fn count_orders_by_status(&self, _s: OrderStatus) -> OrderResult<i64> {
            down()
        }
        async fn sum_revenue(&self) -> OrderResult<f64> {
            down()
        }
        async fn aggregate_top_items(&self, _limit: i64) -> OrderResult<Vec<TopSellingItem>> {
            down()
        }
        async fn select_recent_orders(&self, _limit: i64) -> OrderResult<Vec<RecentOrder>> {
            down()
        }
        async fn ping(&self) -> OrderResult<()> {
            down()
        }
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let mgr = OrderManager::new(Arc::new(UnreachableStore), BillingCalculator::default())
            .with_cache_ttl(Duration::from_secs(30));
        let is_down = |r: OrderResult<()>| matches!(r, Err(OrderError::StorageUnavailable(_)));

        assert!(is_down(mgr.create(draft(one_item(80.0))).await.map(|_| ())));
        assert!(is_down(mgr.get_by_id_or_number("k").await.map(|_| ())));
        assert!(is_down(
            mgr.update_by_id_or_number("k", &OrderPatch::default())
                .await
                .map(|_| ())
        ));
        assert!(is_down(mgr.remove("k").await.map(|_| ())));
        assert!(is_down(mgr.clear_all().await.map(|_| ())));
        assert!(is_down(mgr.stats().await.map(|_| ())));
        assert!(is_down(mgr.list(&OrderFilter::default()).await.map(|_| ())));
        assert!(is_down(mgr.ping().await));
        // validation still happens before storage is touched
        assert!(matches!(
            mgr.create(draft(Vec::new())).await,
            Err(OrderError::InvalidInput(ErrorCode::OrderEmpty, _))
        ));
    }

    #[tokio::test]
    async fn test_quote_matches_created_order() {
        let mgr = manager().await;
        let items = vec![
            OrderItem::new("i1", "Idli", 40.0, 3),
            OrderItem::new("i2", "Vada", 35.0, 2),
        ];
        let lines: Vec<BillLine> = items.iter().map(BillLine::from).collect();
        let quote = mgr.quote(&lines).unwrap();
        let order = mgr.create(draft(items)).await.unwrap();
        assert!(quote.matches_total(order.total));
    }
}
