//! Order Server - 外卖订单后端
//!
//! # 模块结构
//!
//! ```text
//! order-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── billing/       # 账单计算 (小计、配送费、平台费、税)
//! ├── orders/        # 订单管理、状态机、缓存、收据
//! ├── db/            # SQLite 连接池、迁移、仓储
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志
//! ```

pub mod api;
pub mod billing;
pub mod core;
pub mod db;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use billing::{BillingCalculator, FeeSchedule};
pub use crate::core::{Config, Server, ServerError, ServerState};
pub use orders::{OrderError, OrderManager, OrderResult, OrderStore};
pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
   ____          __
  / __ \_______/ /__  _____
 / / / / ___/ __  / _ \/ ___/
/ /_/ / /  / /_/ /  __/ /
\____/_/   \__,_/\___/_/
    "#
    );
}
