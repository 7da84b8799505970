//! 积分账本
//!
//! 只负责记账：追加不可变流水并原子地累加余额、累计积分与行为计数。
//! 不触发成就评估，评估由触发协调器负责。

use std::sync::Arc;

use reward_shared::observability::metrics;
use tracing::{debug, info, instrument};

use super::dto::AwardReceipt;
use crate::error::{Result, RewardError};
use crate::models::{ActionType, IdempotencyKey, RewardRules, RewardTransaction};
use crate::notification::NotificationDispatcher;
use crate::repository::{AppendOutcome, RewardStore};

/// 积分账本
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn RewardStore>,
    rules: Arc<RewardRules>,
    notifier: NotificationDispatcher,
}

impl CreditLedger {
    pub fn new(
        store: Arc<dyn RewardStore>,
        rules: Arc<RewardRules>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            rules,
            notifier,
        }
    }

    /// 发放积分
    ///
    /// 同一幂等键重复调用返回原始发放值，不重复入账。
    /// 成功后通知接收方（含重放，至少一次投递）；通知失败不影响返回结果。
    #[instrument(skip(self, metadata), fields(user_id = %user_id, action_type = %action_type, key = %key))]
    pub async fn award(
        &self,
        user_id: &str,
        action_type: ActionType,
        metadata: Option<serde_json::Value>,
        key: &IdempotencyKey,
    ) -> Result<AwardReceipt> {
        let receipt = self.record(user_id, action_type, metadata, key).await?;
        self.notify(user_id, &receipt).await;
        Ok(receipt)
    }

    /// 记账但不通知
    pub(crate) async fn record(
        &self,
        user_id: &str,
        action_type: ActionType,
        metadata: Option<serde_json::Value>,
        key: &IdempotencyKey,
    ) -> Result<AwardReceipt> {
        if !self.store.user_exists(user_id).await? {
            return Err(RewardError::UserNotFound(user_id.to_string()));
        }

        let credits = self.rules.rate(action_type);
        let transaction = RewardTransaction::new(key, user_id, action_type, credits, metadata);

        match self.store.append_transaction_if_absent(&transaction).await? {
            AppendOutcome::Inserted(tx) => {
                metrics::record_credits_awarded(action_type.as_str(), tx.credits);
                info!(transaction_id = %tx.id, credits = tx.credits, "积分入账成功");
                Ok(AwardReceipt {
                    transaction_id: tx.id,
                    action_type: tx.action_type,
                    credits: tx.credits,
                    replayed: false,
                })
            }
            AppendOutcome::Existing(tx) => {
                // 幂等键按 (用户, 行为, nonce) 派生，不匹配说明调用方复用了键
                if tx.user_id != user_id || tx.action_type != action_type {
                    return Err(RewardError::Validation(format!(
                        "幂等键 {} 已被其他用户或行为使用",
                        key
                    )));
                }
                metrics::record_award_replay(action_type.as_str());
                debug!(transaction_id = %tx.id, credits = tx.credits, "幂等请求，返回已存在的流水");
                Ok(AwardReceipt {
                    transaction_id: tx.id,
                    action_type: tx.action_type,
                    credits: tx.credits,
                    replayed: true,
                })
            }
        }
    }

    pub(crate) async fn notify(&self, user_id: &str, receipt: &AwardReceipt) {
        self.notifier
            .credits_awarded(user_id, receipt.credits, receipt.action_type)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::notification::MockNotificationSink;
    use crate::repository::MockRewardStore;

    fn ledger(store: MockRewardStore, sink: MockNotificationSink) -> CreditLedger {
        CreditLedger::new(
            Arc::new(store),
            Arc::new(RewardRules::standard()),
            NotificationDispatcher::new(Arc::new(sink), Duration::from_millis(100)),
        )
    }

    #[tokio::test]
    async fn test_award_unknown_user_writes_nothing() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(false));
        store.expect_append_transaction_if_absent().never();
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded().never();

        let key = IdempotencyKey::derive("ghost", ActionType::CreatePost, "evt-1");
        let err = ledger(store, sink)
            .award("ghost", ActionType::CreatePost, None, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_award_uses_rate_table_and_notifies() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store
            .expect_append_transaction_if_absent()
            .withf(|tx| tx.credits == 50 && tx.action_type == ActionType::CompleteCourse)
            .times(1)
            .returning(|tx| Ok(AppendOutcome::Inserted(tx.clone())));
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded()
            .withf(|user_id, amount, action| {
                user_id == "u1" && *amount == 50 && *action == ActionType::CompleteCourse
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let key = IdempotencyKey::derive("u1", ActionType::CompleteCourse, "course-9");
        let receipt = ledger(store, sink)
            .award("u1", ActionType::CompleteCourse, None, &key)
            .await
            .unwrap();
        assert_eq!(receipt.credits, 50);
        assert!(!receipt.replayed);
        assert_eq!(receipt.transaction_id, key.as_str());
    }

    #[tokio::test]
    async fn test_award_replay_returns_original_amount() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store.expect_append_transaction_if_absent().returning(|tx| {
            let mut original = tx.clone();
            // 费率调整前入账的原始流水
            original.credits = 8;
            Ok(AppendOutcome::Existing(original))
        });
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded().returning(|_, _, _| Ok(()));

        let key = IdempotencyKey::derive("u1", ActionType::CreatePost, "evt-1");
        let receipt = ledger(store, sink)
            .award("u1", ActionType::CreatePost, None, &key)
            .await
            .unwrap();
        assert!(receipt.replayed);
        assert_eq!(receipt.credits, 8);
    }

    #[tokio::test]
    async fn test_award_rejects_key_owned_by_other_action() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store.expect_append_transaction_if_absent().returning(|tx| {
            let mut other = tx.clone();
            other.action_type = ActionType::DailyLogin;
            Ok(AppendOutcome::Existing(other))
        });
        let sink = MockNotificationSink::new();

        let key = IdempotencyKey::derive("u1", ActionType::CreatePost, "evt-1");
        let err = ledger(store, sink)
            .award("u1", ActionType::CreatePost, None, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Validation(_)));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_award() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store
            .expect_append_transaction_if_absent()
            .returning(|tx| Ok(AppendOutcome::Inserted(tx.clone())));
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded()
            .returning(|_, _, _| Err(RewardError::NotificationFailure("offline".to_string())));

        let key = IdempotencyKey::derive("u1", ActionType::DailyLogin, "2026-10-19");
        let receipt = ledger(store, sink)
            .award("u1", ActionType::DailyLogin, None, &key)
            .await
            .unwrap();
        assert_eq!(receipt.credits, 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates() {
        let mut store = MockRewardStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store
            .expect_append_transaction_if_absent()
            .returning(|_| Err(RewardError::PersistenceUnavailable("timeout".to_string())));
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded().never();

        let key = IdempotencyKey::derive("u1", ActionType::CreatePost, "evt-1");
        let err = ledger(store, sink)
            .award("u1", ActionType::CreatePost, None, &key)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PERSISTENCE_UNAVAILABLE");
    }
}
