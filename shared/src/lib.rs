//! Shared types for the ordering backend
//!
//! Wire/domain types used by the order server and its clients: the order
//! entity and lifecycle enum, billing and stats payloads, and the unified
//! error/response system.

pub mod error;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use order::{Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};
