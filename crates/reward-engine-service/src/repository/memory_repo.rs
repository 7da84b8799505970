//! 内存奖励存储
//!
//! 使用 DashMap 实现的高并发内存存储，适用于本地开发和测试环境。
//! 每个用户的记录通过其 map entry 加锁，追加流水与累加计数在同一把锁内完成。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::traits::{AppendOutcome, CasOutcome, RewardStore};
use crate::error::{Result, RewardError};
use crate::models::{AchievementCategory, RewardTransaction, UserRewardState};

#[derive(Debug)]
struct UserRecord {
    state: UserRewardState,
    /// 按写入顺序排列
    transactions: Vec<RewardTransaction>,
}

/// 内存奖励存储
#[derive(Debug)]
pub struct MemoryRewardStore {
    users: DashMap<String, UserRecord>,
    /// 全局流水索引，保证幂等键跨用户唯一
    transactions: DashMap<String, RewardTransaction>,
    available: AtomicBool,
}

impl Default for MemoryRewardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            transactions: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// 切换可用状态，不可用时所有操作返回 `PersistenceUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 全部流水条数
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RewardError::PersistenceUnavailable(
                "memory store is offline".to_string(),
            ))
        }
    }
}

#[async_trait]
impl RewardStore for MemoryRewardStore {
    async fn register_user(&self, user_id: &str) -> Result<()> {
        self.ensure_available()?;
        self.users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                state: UserRewardState::empty(user_id),
                transactions: Vec::new(),
            });
        Ok(())
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.users.contains_key(user_id))
    }

    async fn get_user_reward_state(&self, user_id: &str) -> Result<Option<UserRewardState>> {
        self.ensure_available()?;
        Ok(self.users.get(user_id).map(|record| record.state.clone()))
    }

    async fn append_transaction_if_absent(
        &self,
        transaction: &RewardTransaction,
    ) -> Result<AppendOutcome> {
        self.ensure_available()?;

        // 先锁用户记录，再锁全局索引，所有写路径保持同一加锁顺序
        let mut record = self
            .users
            .get_mut(&transaction.user_id)
            .ok_or_else(|| RewardError::UserNotFound(transaction.user_id.clone()))?;

        match self.transactions.entry(transaction.id.clone()) {
            Entry::Occupied(existing) => Ok(AppendOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(transaction.clone());
                record.state.apply(transaction);
                record.transactions.push(transaction.clone());
                Ok(AppendOutcome::Inserted(transaction.clone()))
            }
        }
    }

    async fn compare_and_swap_level(
        &self,
        user_id: &str,
        category: AchievementCategory,
        expected: u32,
        new_level: u32,
    ) -> Result<CasOutcome> {
        self.ensure_available()?;

        let mut record = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))?;

        let current = record.state.level(category);
        if current != expected {
            return Ok(CasOutcome::Conflict { current });
        }
        record.state.achievements.insert(category, new_level);
        Ok(CasOutcome::Swapped)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>> {
        self.ensure_available()?;

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .users
            .get(user_id)
            .map(|record| {
                record
                    .transactions
                    .iter()
                    .rev()
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::models::{ActionType, IdempotencyKey};

    fn post(user_id: &str, nonce: &str) -> RewardTransaction {
        RewardTransaction::new(
            &IdempotencyKey::derive(user_id, ActionType::CreatePost, nonce),
            user_id,
            ActionType::CreatePost,
            10,
            None,
        )
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let store = MemoryRewardStore::new();
        store.register_user("u1").await.unwrap();

        let tx = post("u1", "evt-1");
        assert!(store.append_transaction_if_absent(&tx).await.unwrap().is_inserted());
        let replay = store.append_transaction_if_absent(&tx).await.unwrap();
        assert!(!replay.is_inserted());

        let state = store.get_user_reward_state("u1").await.unwrap().unwrap();
        assert_eq!(state.balance, 10);
        assert_eq!(state.counter(ActionType::CreatePost), 1);
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_append_for_unknown_user_fails() {
        let store = MemoryRewardStore::new();
        let err = store
            .append_transaction_if_absent(&post("ghost", "evt-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::UserNotFound(_)));
        assert_eq!(store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_compare_and_swap_level() {
        let store = MemoryRewardStore::new();
        store.register_user("u1").await.unwrap();

        let first = store
            .compare_and_swap_level("u1", AchievementCategory::Posts, 0, 2)
            .await
            .unwrap();
        assert_eq!(first, CasOutcome::Swapped);

        let stale = store
            .compare_and_swap_level("u1", AchievementCategory::Posts, 0, 1)
            .await
            .unwrap();
        assert_eq!(stale, CasOutcome::Conflict { current: 2 });

        let state = store.get_user_reward_state("u1").await.unwrap().unwrap();
        assert_eq!(state.level(AchievementCategory::Posts), 2);
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let store = MemoryRewardStore::new();
        store.register_user("u1").await.unwrap();
        for nonce in ["a", "b", "c"] {
            store.append_transaction_if_absent(&post("u1", nonce)).await.unwrap();
        }

        let listed = store.list_transactions("u1", 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, post("u1", "c").id);
        assert_eq!(listed[1].id, post("u1", "b").id);
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_operations() {
        let store = MemoryRewardStore::new();
        assert_ok!(store.register_user("u1").await);
        store.set_available(false);

        let err = assert_err!(store.get_user_reward_state("u1").await);
        assert_eq!(err.error_code(), "PERSISTENCE_UNAVAILABLE");
        assert_err!(store.register_user("u2").await);

        store.set_available(true);
        let state = assert_ok!(store.get_user_reward_state("u1").await);
        assert!(state.is_some());
    }
}
