//! 奖励引擎服务配置
//!
//! 在共享基础配置之上增加存储后端选择与奖励规则表

use reward_shared::config::{DatabaseConfig, ServerConfig, load_layered};
use reward_shared::observability::ObservabilityConfig;
use serde::Deserialize;

use crate::models::RewardRulesConfig;

pub const SERVICE_NAME: &str = "reward-engine-service";

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储，适用于本地开发与测试
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// 启动时执行数据库迁移（仅 postgres 后端）
    pub run_migrations: bool,
}

/// 服务完整配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RewardEngineConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
    pub rewards: RewardRulesConfig,
}

impl RewardEngineConfig {
    /// 分层加载配置（default.toml -> {env}.toml -> reward-engine-service.toml -> REWARD_*）
    pub fn load() -> Result<Self, config::ConfigError> {
        load_layered(SERVICE_NAME)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RewardRules;

    #[test]
    fn test_default_uses_memory_backend_and_standard_rules() {
        let config = RewardEngineConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(RewardRules::from_config(&config.rewards).is_ok());
    }

    #[test]
    fn test_storage_backend_deserialize() {
        let storage: StorageConfig =
            serde_json::from_str(r#"{"backend":"postgres","run_migrations":true}"#).unwrap();
        assert_eq!(storage.backend, StorageBackend::Postgres);
        assert!(storage.run_migrations);
    }

    fn parse_toml(source: &str) -> Result<RewardEngineConfig, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_unknown_action_type_in_rates_is_rejected() {
        let err = parse_toml(
            r#"
            [[rewards.rates]]
            action_type = "LIKE"
            credits = 5
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_unknown_storage_backend_is_rejected() {
        assert!(parse_toml("[storage]\nbackend = \"redis\"\n").is_err());
        let config = parse_toml("[storage]\nbackend = \"postgres\"\n").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
    }

    #[test]
    fn test_partial_rewards_section_keeps_defaults() {
        let config: RewardEngineConfig =
            serde_json::from_str(r#"{"rewards":{"max_cas_retries":5}}"#).unwrap();
        assert_eq!(config.rewards.max_cas_retries, 5);
        let rules = RewardRules::from_config(&config.rewards).unwrap();
        assert_eq!(rules.unlock_bonus(), 25);
    }
}
