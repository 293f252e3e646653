//! Order API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/orders | GET | 订单列表 (status, userId, restaurantId, orderNumber) |
//! | /api/orders | POST | 下单 |
//! | /api/orders | DELETE | 清空全部订单 |
//! | /api/orders/{key} | GET | 按 id 或订单号查询 |
//! | /api/orders/{key} | PUT | 更新 |
//! | /api/orders/{key} | DELETE | 删除 |
//! | /api/orders/{key}/status | POST | 状态流转 |
//! | /api/orders/{key}/force-status | POST | 强制修改状态 (审计) |
//! | /api/orders/{key}/invoice | GET | 发票 |
//! | /api/orders/{key}/email-receipt | POST | 发送收据 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new()
        .route(
            "/api/orders",
            get(handler::list)
                .post(handler::create)
                .delete(handler::clear_all),
        )
        .route(
            "/api/orders/{key}",
            get(handler::get_by_key)
                .put(handler::update)
                .delete(handler::delete),
        )
        .route("/api/orders/{key}/status", post(handler::change_status))
        .route("/api/orders/{key}/force-status", post(handler::force_status))
        .route("/api/orders/{key}/invoice", get(handler::invoice))
        .route("/api/orders/{key}/email-receipt", post(handler::email_receipt))
}
