//! REST API
//!
//! 对外暴露奖励引擎的 HTTP 接口，统一响应格式 `{success, code, message, data}`

pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;

pub use response::ApiResponse;
pub use routes::build_router;
pub use state::AppState;
