//! Order records
//!
//! - **manager**: [`OrderManager`] create/read/update/delete and dashboard stats
//! - **lifecycle**: status transitions applied to order snapshots
//! - **store**: [`OrderStore`] persistence seam (SQLite impl in `crate::db`)
//! - **cache**: short-lived read cache keyed by id and order number
//! - **notifier**: fire-and-forget receipt delivery
//!
//! ```text
//! HTTP handler → OrderManager → BillingCalculator
//!                     │
//!                     ├──→ OrderStore (SQLite)
//!                     ├──→ OrderCache
//!                     └──→ ReceiptNotifier (spawned)
//! ```

pub mod cache;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod notifier;
pub mod store;

// Re-exports
pub use cache::OrderCache;
pub use error::{OrderError, OrderResult};
pub use manager::OrderManager;
pub use notifier::{LogReceiptNotifier, ReceiptNotifier};
pub use store::{OrderFields, OrderStore};
