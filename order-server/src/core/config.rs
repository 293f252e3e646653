use crate::billing::FeeSchedule;
use std::str::FromStr;
use std::time::Duration;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖 (`.env` 由 dotenv 加载)：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | HTTP_PORT | 5000 | HTTP 服务端口 |
/// | DATABASE_PATH | orders.db | SQLite 数据库文件 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 默认日志级别 (RUST_LOG 优先) |
/// | LOG_DIR | - | 按天滚动的日志目录 (可选) |
/// | DELIVERY_FEE | 40 | 配送费 |
/// | PLATFORM_FEE | 5 | 平台费 |
/// | TAX_RATE_PERCENT | 5 | 税率 (%) |
/// | ORDER_CACHE_TTL_SECS | 30 | 订单缓存过期时间 (0 关闭缓存) |
/// | RECEIPT_ON_CREATE | false | 下单后自动发送收据 |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
///
/// # 示例
///
/// ```ignore
/// HTTP_PORT=8080 DATABASE_PATH=/data/orders.db cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API 服务端口
    pub http_port: u16,
    /// SQLite 数据库文件路径
    pub database_path: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub tax_rate_percent: f64,
    pub order_cache_ttl_secs: u64,
    pub receipt_on_create: bool,
    /// 请求超时时间 (毫秒)
    pub request_timeout_ms: u64,
    /// 无法解析而回退到默认值的变量 (key, 原始值)
    pub rejected: Vec<(String, String)>,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = FeeSchedule::default();
        let mut rejected = Vec::new();
        Self {
            http_port: parse_or(&lookup, "HTTP_PORT", 5000, &mut rejected),
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "orders.db".into()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: lookup("LOG_DIR").filter(|d| !d.trim().is_empty()),
            delivery_fee: parse_or(&lookup, "DELIVERY_FEE", defaults.delivery_fee, &mut rejected),
            platform_fee: parse_or(&lookup, "PLATFORM_FEE", defaults.platform_fee, &mut rejected),
            tax_rate_percent: parse_or(
                &lookup,
                "TAX_RATE_PERCENT",
                defaults.tax_rate_percent,
                &mut rejected,
            ),
            order_cache_ttl_secs: parse_or(&lookup, "ORDER_CACHE_TTL_SECS", 30, &mut rejected),
            receipt_on_create: parse_or(&lookup, "RECEIPT_ON_CREATE", false, &mut rejected),
            request_timeout_ms: parse_or(&lookup, "REQUEST_TIMEOUT_MS", 30000, &mut rejected),
            rejected,
        }
    }

    /// 测试用配置：内存数据库 + 默认费率
    pub fn for_tests() -> Self {
        let mut config = Self::from_lookup(|_| None);
        config.database_path = ":memory:".into();
        config.environment = "test".into();
        config
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            delivery_fee: self.delivery_fee,
            platform_fee: self.platform_fee,
            tax_rate_percent: self.tax_rate_percent,
        }
    }

    pub fn order_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.order_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == ":memory:"
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// 配置在日志初始化之前加载，回退记录在此补打
    pub fn log_rejected(&self) {
        for (key, value) in &self.rejected {
            tracing::warn!(key = %key, value = %value, "Invalid config value, using default");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T, rejected: &mut Vec<(String, String)>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                rejected.push((key.to_string(), raw));
                default
            }
        },
        None => default,
    }
}
