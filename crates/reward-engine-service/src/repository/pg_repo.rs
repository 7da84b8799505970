//! PostgreSQL 奖励存储
//!
//! 流水追加与余额/计数累加在同一个数据库事务内完成；
//! 成就等级的条件更新由单条 SQL 语句完成，不依赖应用层锁。

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use super::traits::{AppendOutcome, CasOutcome, RewardStore};
use crate::error::{Result, RewardError};
use crate::models::{AchievementCategory, ActionType, RewardTransaction, UserRewardState};

/// PostgreSQL 奖励存储
#[derive(Clone)]
pub struct PgRewardStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct BalanceRow {
    balance: i64,
    lifetime: i64,
}

#[derive(FromRow)]
struct CounterRow {
    action_type: ActionType,
    count: i64,
}

#[derive(FromRow)]
struct AchievementRow {
    category: AchievementCategory,
    level: i32,
}

impl PgRewardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 执行内置迁移
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RewardError::Internal(format!("数据库迁移失败: {}", e)))?;
        info!("Reward schema migrations applied");
        Ok(())
    }

    async fn find_transaction(&self, id: &str) -> Result<Option<RewardTransaction>> {
        let existing = sqlx::query_as::<_, RewardTransaction>(
            r#"
            SELECT id, user_id, action_type, credits, metadata, created_at
            FROM reward_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(existing)
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn register_user(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reward_users (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reward_users WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get_user_reward_state(&self, user_id: &str) -> Result<Option<UserRewardState>> {
        // 三张表在同一快照内读取，避免读到半个写入
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let registered = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reward_users WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !registered {
            tx.commit().await?;
            return Ok(None);
        }

        // 首次发放前尚无状态行，按全零处理
        let balance = sqlx::query_as::<_, BalanceRow>(
            "SELECT balance, lifetime FROM user_reward_states WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let counters = sqlx::query_as::<_, CounterRow>(
            "SELECT action_type, count FROM user_action_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let achievements = sqlx::query_as::<_, AchievementRow>(
            "SELECT category, level FROM user_achievements WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut state = UserRewardState::empty(user_id);
        if let Some(row) = balance {
            state.balance = row.balance;
            state.lifetime = row.lifetime;
        }
        state.counters = counters
            .into_iter()
            .map(|row| (row.action_type, row.count.max(0) as u64))
            .collect::<BTreeMap<_, _>>();
        state.achievements = achievements
            .into_iter()
            .map(|row| (row.category, row.level.max(0) as u32))
            .collect::<BTreeMap<_, _>>();

        Ok(Some(state))
    }

    async fn append_transaction_if_absent(
        &self,
        transaction: &RewardTransaction,
    ) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        let registered = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reward_users WHERE user_id = $1)",
        )
        .bind(&transaction.user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !registered {
            tx.rollback().await?;
            return Err(RewardError::UserNotFound(transaction.user_id.clone()));
        }

        let inserted = sqlx::query_as::<_, RewardTransaction>(
            r#"
            INSERT INTO reward_transactions (id, user_id, action_type, credits, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, user_id, action_type, credits, metadata, created_at
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.user_id)
        .bind(transaction.action_type)
        .bind(transaction.credits)
        .bind(&transaction.metadata)
        .bind(transaction.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(inserted) = inserted else {
            tx.rollback().await?;
            let existing = self.find_transaction(&transaction.id).await?.ok_or_else(|| {
                RewardError::Internal(format!("流水冲突但未找到: {}", transaction.id))
            })?;
            debug!(transaction_id = %existing.id, "流水已存在，幂等返回");
            return Ok(AppendOutcome::Existing(existing));
        };

        sqlx::query(
            r#"
            INSERT INTO user_reward_states (user_id, balance, lifetime)
            VALUES ($1, $2, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET balance = user_reward_states.balance + EXCLUDED.balance,
                lifetime = user_reward_states.lifetime + EXCLUDED.lifetime,
                updated_at = NOW()
            "#,
        )
        .bind(&inserted.user_id)
        .bind(inserted.credits)
        .execute(&mut *tx)
        .await?;

        if inserted.action_type.is_counted() {
            sqlx::query(
                r#"
                INSERT INTO user_action_counters (user_id, action_type, count)
                VALUES ($1, $2, 1)
                ON CONFLICT (user_id, action_type) DO UPDATE
                SET count = user_action_counters.count + 1,
                    updated_at = NOW()
                "#,
            )
            .bind(&inserted.user_id)
            .bind(inserted.action_type)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(AppendOutcome::Inserted(inserted))
    }

    async fn compare_and_swap_level(
        &self,
        user_id: &str,
        category: AchievementCategory,
        expected: u32,
        new_level: u32,
    ) -> Result<CasOutcome> {
        // 尚无行时视为等级 0
        let rows = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO user_achievements (user_id, category, level)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, category) DO UPDATE
                SET level = EXCLUDED.level,
                    updated_at = NOW()
                WHERE user_achievements.level = 0
                "#,
            )
            .bind(user_id)
            .bind(category)
            .bind(new_level as i32)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE user_achievements
                SET level = $4, updated_at = NOW()
                WHERE user_id = $1 AND category = $2 AND level = $3
                "#,
            )
            .bind(user_id)
            .bind(category)
            .bind(expected as i32)
            .bind(new_level as i32)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows == 1 {
            return Ok(CasOutcome::Swapped);
        }

        let current = sqlx::query_scalar::<_, i32>(
            "SELECT level FROM user_achievements WHERE user_id = $1 AND category = $2",
        )
        .bind(user_id)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or(0);

        Ok(CasOutcome::Conflict {
            current: current.max(0) as u32,
        })
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>> {
        let rows = sqlx::query_as::<_, RewardTransaction>(
            r#"
            SELECT id, user_id, action_type, credits, metadata, created_at
            FROM reward_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
