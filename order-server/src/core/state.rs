use std::sync::Arc;

use crate::billing::BillingCalculator;
use crate::core::{Config, Result, ServerError};
use crate::db::{DbService, SqliteOrderStore};
use crate::orders::{LogReceiptNotifier, OrderManager};

/// 服务器状态 - 持有所有服务的共享引用
///
/// Clone 只复制 Arc / 连接池句柄。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | DbService | SQLite 连接池 |
/// | orders | Arc<OrderManager> | 订单管理 (计费、状态机、缓存、收据) |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub orders: Arc<OrderManager>,
}

impl ServerState {
    pub fn new(config: Config, db: DbService, orders: Arc<OrderManager>) -> Self {
        Self { config, db, orders }
    }

    /// 初始化服务器状态
    ///
    /// 1. 校验费率配置
    /// 2. 打开数据库并执行迁移
    /// 3. 组装 OrderManager (SQLite 存储 + 缓存 + 日志收据)
    pub async fn initialize(config: &Config) -> Result<Self> {
        let calculator = BillingCalculator::new(config.fee_schedule())
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let db = if config.is_in_memory() {
            DbService::open_in_memory().await?
        } else {
            DbService::new(&config.database_path).await?
        };

        let store = Arc::new(SqliteOrderStore::new(db.pool.clone()));
        let orders = OrderManager::new(store, calculator)
            .with_cache_ttl(config.order_cache_ttl())
            .with_notifier(Arc::new(LogReceiptNotifier), config.receipt_on_create);

        tracing::info!(
            delivery_fee = config.delivery_fee,
            platform_fee = config.platform_fee,
            tax_rate_percent = config.tax_rate_percent,
            cache_ttl_secs = config.order_cache_ttl_secs,
            "Order manager ready"
        );

        Ok(Self::new(config.clone(), db, Arc::new(orders)))
    }

    /// 订单管理器
    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub async fn shutdown(&self) {
        self.db.close().await;
        tracing::info!("Database connections closed");
    }
}
