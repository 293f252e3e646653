//! Receipt notification (email/SMS stub)

use async_trait::async_trait;

/// Delivers a receipt for a placed order
///
/// Called fire-and-forget; a failure is logged and never affects the order.
#[async_trait]
pub trait ReceiptNotifier: Send + Sync {
    async fn send_receipt(&self, order_id: &str) -> anyhow::Result<()>;
}

/// Logs the receipt instead of sending it
#[derive(Debug, Default, Clone)]
pub struct LogReceiptNotifier;

#[async_trait]
impl ReceiptNotifier for LogReceiptNotifier {
    async fn send_receipt(&self, order_id: &str) -> anyhow::Result<()> {
        tracing::info!(order_id = %order_id, "Receipt queued");
        Ok(())
    }
}
