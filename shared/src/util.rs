/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Prefix of every generated order id
pub const ORDER_ID_PREFIX: &str = "ord_";

/// Generate an opaque order id: `ord_` + 32 hex chars (uuid v4, simple form).
pub fn new_order_id() -> String {
    format!("{}{}", ORDER_ID_PREFIX, uuid::Uuid::new_v4().simple())
}

/// Human-readable order number for a sequence value, e.g. `ORD000042`.
///
/// Values above 999999 widen instead of truncating.
pub fn format_order_number(seq: i64) -> String {
    format!("ORD{:06}", seq)
}
