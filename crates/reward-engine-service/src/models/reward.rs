//! 奖励账本实体定义
//!
//! 包含用户奖励状态、不可变的奖励交易流水以及幂等键

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::enums::{AchievementCategory, ActionType};

/// 用户奖励状态
///
/// 每个用户一条，由持久化层持有。`balance`/`lifetime` 等于该用户全部流水积分之和，
/// 计数与成就等级只增不减。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRewardState {
    pub user_id: String,
    /// 当前可用积分
    pub balance: i64,
    /// 历史累计积分
    pub lifetime: i64,
    /// 行为计数（解锁奖励不计入）
    pub counters: BTreeMap<ActionType, u64>,
    /// 成就分类 -> 已解锁等级（0 表示未解锁）
    pub achievements: BTreeMap<AchievementCategory, u32>,
}

impl UserRewardState {
    /// 全零初始状态
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: 0,
            lifetime: 0,
            counters: BTreeMap::new(),
            achievements: BTreeMap::new(),
        }
    }

    pub fn counter(&self, action: ActionType) -> u64 {
        self.counters.get(&action).copied().unwrap_or(0)
    }

    pub fn level(&self, category: AchievementCategory) -> u32 {
        self.achievements.get(&category).copied().unwrap_or(0)
    }

    /// 应用一条新写入的流水
    ///
    /// 仅供持久化适配器在原子单元内调用
    pub fn apply(&mut self, transaction: &RewardTransaction) {
        self.balance += transaction.credits;
        self.lifetime += transaction.credits;
        if transaction.action_type.is_counted() {
            *self.counters.entry(transaction.action_type).or_insert(0) += 1;
        }
    }
}

/// 奖励交易流水
///
/// 只追加、不可修改。`id` 为幂等键，同一逻辑事件重试时不会重复入账。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardTransaction {
    pub id: String,
    pub user_id: String,
    pub action_type: ActionType,
    pub credits: i64,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RewardTransaction {
    pub fn new(
        key: &IdempotencyKey,
        user_id: &str,
        action_type: ActionType,
        credits: i64,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: key.as_str().to_string(),
            user_id: user_id.to_string(),
            action_type,
            credits,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// 幂等键
///
/// 由 (userId, actionType, 因果 nonce) 确定性派生，不依赖时间戳
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    const PREFIX: &'static str = "rtx_";

    /// 为一次逻辑行为派生幂等键
    pub fn derive(user_id: &str, action_type: ActionType, nonce: &str) -> Self {
        let mut hasher = Sha256::new();
        // 分隔符避免字段拼接歧义
        hasher.update(user_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(action_type.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(nonce.as_bytes());
        Self(format!("{}{:x}", Self::PREFIX, hasher.finalize()))
    }

    /// 成就解锁奖励的幂等键
    ///
    /// 每个 (分类, 等级) 至多发放一次解锁奖励
    pub fn for_unlock(user_id: &str, category: AchievementCategory, level: u32) -> Self {
        Self::derive(
            user_id,
            ActionType::AchievementUnlock,
            &format!("{}:{}", category.as_str(), level),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
