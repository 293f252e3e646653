//! Read-through order cache
//!
//! Entries are keyed by order id, with a second map resolving order numbers to
//! ids. An entry is served for at most `ttl` after it was stored; writes go
//! through the manager, which invalidates the affected order.

use dashmap::DashMap;
use shared::order::Order;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedOrder {
    order: Order,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct OrderCache {
    ttl: Duration,
    by_id: DashMap<String, CachedOrder>,
    /// order_number → id
    numbers: DashMap<String, String>,
}

impl OrderCache {
    /// A zero `ttl` disables caching
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            by_id: DashMap::new(),
            numbers: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Cached order whose id is `id`
    pub fn get_by_id(&self, id: &str) -> Option<Order> {
        if !self.is_enabled() {
            return None;
        }
        let fresh = self
            .by_id
            .get(id)
            .map(|entry| (entry.stored_at.elapsed() < self.ttl, entry.order.clone()));
        match fresh {
            Some((true, order)) => Some(order),
            Some((false, _)) => {
                self.invalidate(id);
                None
            }
            None => None,
        }
    }

    /// Cached order whose order number is `order_number`
    ///
    /// Does not rule out another order having `order_number` as its id; the
    /// caller checks ids first.
    pub fn get_by_number(&self, order_number: &str) -> Option<Order> {
        if !self.is_enabled() {
            return None;
        }
        let id = self.numbers.get(order_number).map(|id| id.value().clone())?;
        let order = self.get_by_id(&id);
        if order.is_none() {
            // alias outlived its entry
            self.numbers.remove(order_number);
        }
        order
    }

    pub fn put(&self, order: &Order) {
        if !self.is_enabled() {
            return;
        }
        self.numbers
            .insert(order.order_number.clone(), order.id.clone());
        self.by_id.insert(
            order.id.clone(),
            CachedOrder {
                order: order.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop one order and its number alias
    pub fn invalidate(&self, id: &str) {
        if let Some((_, cached)) = self.by_id.remove(id) {
            self.numbers.remove(&cached.order.order_number);
        }
    }

    pub fn clear(&self) {
        self.by_id.clear();
        self.numbers.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
