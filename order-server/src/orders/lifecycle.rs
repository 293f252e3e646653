//! Status changes on order snapshots
//!
//! The transition table itself lives on [`OrderStatus`]; this module applies it
//! to whole orders and provides the unchecked override used by admin corrections.

use super::error::{OrderError, OrderResult};
use shared::order::{Order, OrderStatus};
use shared::util::now_millis;

/// Return a copy of `order` moved to `to`, with `updated_at` refreshed
pub fn apply(order: &Order, to: OrderStatus) -> OrderResult<Order> {
    if !order.status.can_transition(to) {
        return Err(OrderError::InvalidTransition {
            from: order.status,
            to,
        });
    }
    Ok(with_status(order, to))
}

/// Move `order` to `to` without consulting the transition table
///
/// Callers are responsible for auditing the override.
pub fn force(order: &Order, to: OrderStatus) -> Order {
    with_status(order, to)
}

/// Resolve the status requested by an update patch
///
/// Re-sending the current status is not a change and returns `None`.
pub fn check_patch_status(
    current: OrderStatus,
    requested: Option<OrderStatus>,
) -> OrderResult<Option<OrderStatus>> {
    match requested {
        None => Ok(None),
        Some(to) if to == current => Ok(None),
        Some(to) if current.can_transition(to) => Ok(Some(to)),
        Some(to) => Err(OrderError::InvalidTransition { from: current, to }),
    }
}

fn with_status(order: &Order, to: OrderStatus) -> Order {
    let mut next = order.clone();
    next.status = to;
    // 保证 updated_at 单调递增（同一毫秒内连续修改）
    next.updated_at = now_millis().max(order.updated_at + 1);
    next
}
