//! Order domain types
//!
//! - [`Order`] and its line items, frozen at checkout
//! - [`OrderStatus`] lifecycle state machine
//! - Billing payloads ([`Breakdown`], [`Invoice`]) and dashboard [`OrderStats`]

pub mod billing;
pub mod stats;
pub mod status;
pub mod types;

// Re-exports
pub use billing::{BillLine, Breakdown, CartQuoteRequest, Invoice, MONEY_TOLERANCE};
pub use stats::{OrderStats, RecentOrder, TopSellingItem};
pub use status::{OrderStatus, UnknownStatus};
pub use types::*;
