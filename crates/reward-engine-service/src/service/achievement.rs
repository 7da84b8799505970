//! 成就评估器
//!
//! 根据已持久化的行为计数计算每个分类可达到的最高等级，
//! 通过 CAS 写入新等级。冲突时重新读取并重试，次数有上限。
//!
//! 评估只依赖已持久化的计数，任意时刻重复执行都是幂等的。

use std::sync::Arc;

use reward_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use super::dto::{AchievementUnlock, EvaluationReport};
use crate::error::{Result, RewardError};
use crate::models::{AchievementCategory, RewardRules, UserRewardState};
use crate::repository::{CasOutcome, RewardStore};

/// 成就评估器
#[derive(Clone)]
pub struct AchievementEvaluator {
    store: Arc<dyn RewardStore>,
    rules: Arc<RewardRules>,
}

impl AchievementEvaluator {
    pub fn new(store: Arc<dyn RewardStore>, rules: Arc<RewardRules>) -> Self {
        Self { store, rules }
    }

    /// 评估用户全部成就分类
    ///
    /// 返回本次新写入的所有等级（跨越多个门槛时包含中间等级）。
    /// 单个分类重试耗尽时记入 `deferred`，不影响其他分类。
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn evaluate(&self, user_id: &str) -> Result<EvaluationReport> {
        let mut state = self.load_state(user_id).await?;
        let mut report = EvaluationReport::default();

        for category in AchievementCategory::ALL {
            match self.evaluate_category(user_id, category, &mut state).await {
                Ok(unlocks) => report.unlocks.extend(unlocks),
                Err(RewardError::EvaluationConflict { attempts, .. }) => {
                    warn!(
                        category = %category,
                        attempts,
                        "成就等级更新冲突重试耗尽，推迟到下次评估"
                    );
                    report.deferred.push(category);
                }
                Err(e) => return Err(e),
            }
        }

        if !report.unlocks.is_empty() {
            info!(unlock_count = report.unlocks.len(), "成就评估完成");
        }
        Ok(report)
    }

    async fn evaluate_category(
        &self,
        user_id: &str,
        category: AchievementCategory,
        state: &mut UserRewardState,
    ) -> Result<Vec<AchievementUnlock>> {
        let max_attempts = self.rules.max_cas_retries();

        for attempt in 1..=max_attempts {
            let counter = state.counter(category.counter_action());
            let current = state.level(category);
            let target = self.rules.level_for(category, counter);

            if target <= current {
                return Ok(Vec::new());
            }

            match self
                .store
                .compare_and_swap_level(user_id, category, current, target)
                .await?
            {
                CasOutcome::Swapped => {
                    state.achievements.insert(category, target);
                    let unlocks = self.unlocks_between(category, current, target);
                    for unlock in &unlocks {
                        metrics::record_achievement_unlock(category.as_str());
                        info!(
                            category = %category,
                            level = unlock.level,
                            threshold = unlock.threshold,
                            "成就解锁"
                        );
                    }
                    return Ok(unlocks);
                }
                CasOutcome::Conflict { current: observed } => {
                    metrics::record_cas_conflict(category.as_str());
                    debug!(
                        category = %category,
                        expected = current,
                        observed,
                        attempt,
                        "成就等级 CAS 冲突，重新读取"
                    );
                    // 计数可能也已变化，整体重读
                    *state = self.load_state(user_id).await?;
                }
            }
        }

        // 最后一次冲突后的重读结果：胜出方已写到目标等级或更高时无需再写
        let counter = state.counter(category.counter_action());
        if self.rules.level_for(category, counter) <= state.level(category) {
            return Ok(Vec::new());
        }

        Err(RewardError::EvaluationConflict {
            user_id: user_id.to_string(),
            category,
            attempts: max_attempts,
        })
    }

    /// (old, new] 区间内的全部等级
    fn unlocks_between(
        &self,
        category: AchievementCategory,
        old_level: u32,
        new_level: u32,
    ) -> Vec<AchievementUnlock> {
        let thresholds = self.rules.thresholds(category);
        (old_level + 1..=new_level)
            .map(|level| AchievementUnlock {
                category,
                level,
                threshold: thresholds[(level - 1) as usize],
            })
            .collect()
    }

    async fn load_state(&self, user_id: &str) -> Result<UserRewardState> {
        self.store
            .get_user_reward_state(user_id)
            .await?
            .ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::models::ActionType;
    use crate::repository::MockRewardStore;

    fn state_with(posts: u64, posts_level: u32) -> UserRewardState {
        let mut state = UserRewardState::empty("u1");
        state.counters.insert(ActionType::CreatePost, posts);
        if posts_level > 0 {
            state.achievements.insert(AchievementCategory::Posts, posts_level);
        }
        state
    }

    fn evaluator(store: MockRewardStore) -> AchievementEvaluator {
        AchievementEvaluator::new(Arc::new(store), Arc::new(RewardRules::standard()))
    }

    #[tokio::test]
    async fn test_jump_reports_every_crossed_level() {
        let mut store = MockRewardStore::new();
        store
            .expect_get_user_reward_state()
            .returning(|_| Ok(Some(state_with(7, 0))));
        store
            .expect_compare_and_swap_level()
            .withf(|_, category, expected, new_level| {
                *category == AchievementCategory::Posts && *expected == 0 && *new_level == 2
            })
            .times(1)
            .returning(|_, _, _, _| Ok(CasOutcome::Swapped));

        let report = evaluator(store).evaluate("u1").await.unwrap();
        let levels: Vec<u32> = report.unlocks.iter().map(|u| u.level).collect();
        assert_eq!(levels, vec![1, 2]);
        assert_eq!(report.unlocks[0].threshold, 1);
        assert_eq!(report.unlocks[1].threshold, 5);
        assert!(report.deferred.is_empty());
    }

    #[tokio::test]
    async fn test_no_cas_when_already_at_target() {
        let mut store = MockRewardStore::new();
        store
            .expect_get_user_reward_state()
            .returning(|_| Ok(Some(state_with(7, 2))));
        store.expect_compare_and_swap_level().never();

        let report = evaluator(store).evaluate("u1").await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_retries_against_fresh_state() {
        let reads = Arc::new(AtomicU32::new(0));
        let reads_in_mock = reads.clone();

        let mut store = MockRewardStore::new();
        store.expect_get_user_reward_state().returning(move |_| {
            // 第一次读到 0 级；重读时另一评估已写入 1 级，计数也涨到 10
            if reads_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(state_with(7, 0)))
            } else {
                Ok(Some(state_with(10, 1)))
            }
        });
        store
            .expect_compare_and_swap_level()
            .withf(|_, _, expected, _| *expected == 0)
            .times(1)
            .returning(|_, _, _, _| Ok(CasOutcome::Conflict { current: 1 }));
        store
            .expect_compare_and_swap_level()
            .withf(|_, _, expected, new_level| *expected == 1 && *new_level == 3)
            .times(1)
            .returning(|_, _, _, _| Ok(CasOutcome::Swapped));

        let report = evaluator(store).evaluate("u1").await.unwrap();
        let levels: Vec<u32> = report.unlocks.iter().map(|u| u.level).collect();
        // 1 级由竞争方写入并报告，本次只报告 2、3 级
        assert_eq!(levels, vec![2, 3]);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_conflict_resolved_by_winner_is_noop() {
        let reads = Arc::new(AtomicU32::new(0));
        let reads_in_mock = reads.clone();

        let mut store = MockRewardStore::new();
        store.expect_get_user_reward_state().returning(move |_| {
            if reads_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(state_with(5, 0)))
            } else {
                Ok(Some(state_with(5, 2)))
            }
        });
        store
            .expect_compare_and_swap_level()
            .times(1)
            .returning(|_, _, _, _| Ok(CasOutcome::Conflict { current: 2 }));

        let report = evaluator(store).evaluate("u1").await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_last_attempt_conflict_settled_by_winner_is_noop() {
        let mut config = RewardRules::standard().to_config();
        config.max_cas_retries = 1;
        let rules = RewardRules::from_config(&config).unwrap();

        let reads = Arc::new(AtomicU32::new(0));
        let reads_in_mock = reads.clone();
        let mut store = MockRewardStore::new();
        store.expect_get_user_reward_state().returning(move |_| {
            if reads_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(state_with(5, 0)))
            } else {
                Ok(Some(state_with(5, 2)))
            }
        });
        store
            .expect_compare_and_swap_level()
            .times(1)
            .returning(|_, _, _, _| Ok(CasOutcome::Conflict { current: 2 }));

        let report = AchievementEvaluator::new(Arc::new(store), Arc::new(rules))
            .evaluate("u1")
            .await
            .unwrap();
        assert!(report.unlocks.is_empty());
        assert!(report.deferred.is_empty());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_defer_category() {
        let mut store = MockRewardStore::new();
        store
            .expect_get_user_reward_state()
            .returning(|_| Ok(Some(state_with(7, 0))));
        store
            .expect_compare_and_swap_level()
            .times(3)
            .returning(|_, _, _, _| Ok(CasOutcome::Conflict { current: 0 }));

        let report = evaluator(store).evaluate("u1").await.unwrap();
        assert!(report.unlocks.is_empty());
        assert_eq!(report.deferred, vec![AchievementCategory::Posts]);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let mut store = MockRewardStore::new();
        store.expect_get_user_reward_state().returning(|_| Ok(None));

        let err = evaluator(store).evaluate("ghost").await.unwrap_err();
        assert!(matches!(err, RewardError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let mut store = MockRewardStore::new();
        store
            .expect_get_user_reward_state()
            .returning(|_| Ok(Some(state_with(1, 0))));
        store
            .expect_compare_and_swap_level()
            .returning(|_, _, _, _| Err(RewardError::PersistenceUnavailable("down".to_string())));

        let err = evaluator(store).evaluate("u1").await.unwrap_err();
        assert_eq!(err.error_code(), "PERSISTENCE_UNAVAILABLE");
    }
}
