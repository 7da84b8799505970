//! 仓储 Trait 定义
//!
//! 奖励引擎依赖的持久化端口。服务层只依赖此抽象，内存与 PostgreSQL 两种适配器实现同一契约，
//! 单元测试通过 mockall 生成的 `MockRewardStore` 模拟冲突与故障。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AchievementCategory, RewardTransaction, UserRewardState};

/// 追加流水的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// 新写入，余额、累计与计数已在同一原子单元内更新
    Inserted(RewardTransaction),
    /// 幂等键已存在，返回原始流水，状态未变
    Existing(RewardTransaction),
}

impl AppendOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// 成就等级 CAS 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped,
    /// 存储值已不等于期望值，返回当前值
    Conflict { current: u32 },
}

/// 奖励存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardStore: Send + Sync {
    /// 登记用户（幂等）
    async fn register_user(&self, user_id: &str) -> Result<()>;

    async fn user_exists(&self, user_id: &str) -> Result<bool>;

    /// 读取用户奖励状态，未登记用户返回 None
    async fn get_user_reward_state(&self, user_id: &str) -> Result<Option<UserRewardState>>;

    /// 追加流水；仅在新写入时原子地累加余额、累计积分与行为计数
    async fn append_transaction_if_absent(
        &self,
        transaction: &RewardTransaction,
    ) -> Result<AppendOutcome>;

    /// 条件更新成就等级：仅当存储值等于 `expected` 时写入 `new_level`
    async fn compare_and_swap_level(
        &self,
        user_id: &str,
        category: AchievementCategory,
        expected: u32,
        new_level: u32,
    ) -> Result<CasOutcome>;

    /// 按时间倒序列出用户流水
    async fn list_transactions(&self, user_id: &str, limit: i64)
    -> Result<Vec<RewardTransaction>>;
}
