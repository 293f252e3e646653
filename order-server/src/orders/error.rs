//! Order module errors

use shared::error::{AppError, ErrorCode};
use shared::order::OrderStatus;
use thiserror::Error;

/// Errors surfaced by the billing calculator, the lifecycle rules and the
/// order record manager
///
/// "Not found" is not an error: lookups return `Ok(None)`.
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    /// Malformed input. The code narrows down which rule was broken.
    #[error("{1}")]
    InvalidInput(ErrorCode, String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Order number already exists: {0}")]
    DuplicateOrderNumber(String),
}

impl OrderError {
    pub fn invalid_with(code: ErrorCode, msg: impl Into<String>) -> Self {
        OrderError::InvalidInput(code, msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        OrderError::StorageUnavailable(err.to_string())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidInput(code, msg) => AppError::with_message(code, msg),
            OrderError::InvalidTransition { from, to } => AppError::with_message(
                ErrorCode::OrderInvalidTransition,
                format!("Cannot change order status from {} to {}", from, to),
            )
            .with_detail("from", from.as_str())
            .with_detail("to", to.as_str()),
            OrderError::StorageUnavailable(msg) => {
                // 细节只进日志，不返回给客户端
                tracing::error!(error = %msg, "Order storage unavailable");
                AppError::new(ErrorCode::StorageUnavailable)
            }
            OrderError::DuplicateOrderNumber(number) => AppError::with_message(
                ErrorCode::OrderNumberExists,
                format!("Order number {} already exists", number),
            )
            .with_detail("orderNumber", number),
        }
    }
}
