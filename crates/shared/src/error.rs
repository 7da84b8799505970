//! 基础设施错误类型
//!
//! 共享层只关心数据库连接，业务错误由各服务自行定义。
//! 配置加载直接返回 `config::ConfigError`，可观测性初始化使用 `anyhow`。

use thiserror::Error;

/// 基础设施错误
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, InfraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_conversion() {
        let err: InfraError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, InfraError::Database(_)));
        assert!(err.to_string().starts_with("数据库错误"));
    }
}
