//! 奖励服务领域模型
//!
//! 包含奖励账本与成就系统的核心实体定义

pub mod enums;
pub mod reward;
pub mod rules;

pub use enums::{AchievementCategory, ActionType};
pub use reward::{IdempotencyKey, RewardTransaction, UserRewardState};
pub use rules::{RateEntry, RewardRules, RewardRulesConfig, ThresholdEntry};
