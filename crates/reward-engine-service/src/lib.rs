//! 奖励引擎服务
//!
//! 把离散的用户行为转换为持久化的积分余额，并在行为计数跨越分级门槛时解锁成就。
//!
//! ## 核心功能
//!
//! - **积分账本**：幂等地追加不可变流水，原子地累加余额、累计积分与行为计数
//! - **成就评估**：按门槛表计算最高等级，通过 CAS 无锁升级
//! - **触发协调**：入账 → 评估 → 发放解锁奖励 → 复核，两轮内必然终止
//! - **对账**：部分失败后补发解锁奖励，不会重复发放
//! - **通知**：持久化成功后投递奖励事件，失败不影响账本
//!
//! ## 模块结构
//!
//! - `models`: 领域模型与静态奖励规则
//! - `error`: 错误类型定义
//! - `config`: 服务配置
//! - `repository`: 持久化端口及内存、PostgreSQL 适配器
//! - `service`: 账本、评估器与协调器
//! - `notification`: 通知接收方与分发器
//! - `http`: REST API

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;

pub use config::{RewardEngineConfig, StorageBackend};
pub use error::{Result, RewardError};
pub use models::*;
pub use notification::{ChannelNotificationSink, LogNotificationSink, NotificationSink, RewardEvent};
pub use repository::{AppendOutcome, CasOutcome, MemoryRewardStore, PgRewardStore, RewardStore};
pub use service::{
    AchievementEvaluator, AchievementProgress, AchievementUnlock, ActionOutcome, ActionRequest,
    AwardReceipt, BalanceView, CreditLedger, EvaluationReport, ReconcileOutcome,
    TriggerCoordinator,
};
