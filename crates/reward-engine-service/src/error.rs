//! 奖励服务错误类型
//!
//! 定义账本、成就评估与触发协调过程中的业务错误和系统错误。
//! 重复交易（幂等重放）不是错误，由仓储返回 `AppendOutcome::Existing` 表达。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::models::AchievementCategory;

/// 奖励服务错误类型
#[derive(Debug, Error)]
pub enum RewardError {
    // === 用户相关错误 ===
    #[error("用户不存在: {0}")]
    UserNotFound(String),

    // === 成就评估错误 ===
    #[error("成就等级更新冲突: user_id={user_id}, category={category}, attempts={attempts}")]
    EvaluationConflict {
        user_id: String,
        category: AchievementCategory,
        attempts: u32,
    },

    // === 通知错误 ===
    #[error("通知发送失败: {0}")]
    NotificationFailure(String),

    // === 系统错误 ===
    #[error("存储不可用: {0}")]
    PersistenceUnavailable(String),

    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("奖励规则配置无效: {0}")]
    Configuration(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 奖励服务 Result 类型别名
pub type Result<T> = std::result::Result<T, RewardError>;

/// 连接层面的故障统一视为存储不可用，其余保留原始数据库错误
impl From<sqlx::Error> for RewardError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::PersistenceUnavailable(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl RewardError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::PersistenceUnavailable(_) | Self::EvaluationConflict { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::EvaluationConflict { .. } => "EVALUATION_CONFLICT",
            Self::NotificationFailure(_) => "NOTIFICATION_FAILURE",
            Self::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::EvaluationConflict { .. } => StatusCode::CONFLICT,
            Self::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotificationFailure(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RewardError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}
