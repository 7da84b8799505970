//! 应用状态定义

use std::sync::Arc;

use crate::service::TriggerCoordinator;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TriggerCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<TriggerCoordinator>) -> Self {
        Self { coordinator }
    }
}
