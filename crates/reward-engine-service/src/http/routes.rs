//! 路由配置模块

use axum::{
    Router, middleware,
    routing::{get, post},
};
use reward_shared::observability::middleware::http_tracing;

use super::{handlers, state::AppState};

/// 用户奖励相关路由
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}", post(handlers::register_user))
        .route("/users/{user_id}/actions", post(handlers::submit_action))
        .route("/users/{user_id}/balance", get(handlers::get_balance))
        .route(
            "/users/{user_id}/achievements",
            get(handlers::get_achievements),
        )
        .route(
            "/users/{user_id}/transactions",
            get(handlers::list_transactions),
        )
        .route("/users/{user_id}/reconcile", post(handlers::reconcile))
}

/// 构建完整路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", user_routes())
        .layer(middleware::from_fn(http_tracing))
        .with_state(state)
}
