//! 触发协调器
//!
//! 编排一次用户行为的完整处理：
//! 1. 账本入账（失败则整个调用失败）
//! 2. 成就评估
//! 3. 逐个解锁：先通知解锁，再发放解锁奖励
//! 4. 复核评估一次
//!
//! 解锁奖励不计入任何门槛计数，第 4 步在顺序执行下必然为空，流程在两轮内终止。
//! 第 2、3 步的失败不回滚第 1 步，只标记待对账。

use std::sync::Arc;
use std::time::Instant;

use reward_shared::observability::metrics;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::achievement::AchievementEvaluator;
use super::dto::{
    AchievementProgress, AchievementUnlock, ActionOutcome, ActionRequest, BalanceView,
    ReconcileOutcome,
};
use super::ledger::CreditLedger;
use crate::error::{Result, RewardError};
use crate::models::{
    AchievementCategory, ActionType, IdempotencyKey, RewardRules, RewardTransaction,
    UserRewardState,
};
use crate::notification::{NotificationDispatcher, NotificationSink};
use crate::repository::RewardStore;

/// 流水查询单页上限
pub const MAX_TRANSACTION_PAGE: i64 = 500;

/// 解锁奖励的结算结果
#[derive(Debug, Default)]
struct Settlement {
    unlocks: Vec<AchievementUnlock>,
    bonus_credits: i64,
    failed: bool,
}

/// 触发协调器
#[derive(Clone)]
pub struct TriggerCoordinator {
    store: Arc<dyn RewardStore>,
    rules: Arc<RewardRules>,
    ledger: CreditLedger,
    evaluator: AchievementEvaluator,
    notifier: NotificationDispatcher,
}

impl TriggerCoordinator {
    pub fn new(
        store: Arc<dyn RewardStore>,
        rules: Arc<RewardRules>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let notifier = NotificationDispatcher::new(sink, rules.notification_timeout());
        Self {
            ledger: CreditLedger::new(store.clone(), rules.clone(), notifier.clone()),
            evaluator: AchievementEvaluator::new(store.clone(), rules.clone()),
            store,
            rules,
            notifier,
        }
    }

    /// 登记用户（幂等）
    #[instrument(skip(self))]
    pub async fn register_user(&self, user_id: &str) -> Result<BalanceView> {
        validate_user_id(user_id)?;
        self.store.register_user(user_id).await?;
        info!(user_id = %user_id, "用户已登记");
        self.get_balance(user_id).await
    }

    /// 处理一次用户行为
    #[instrument(skip(self, request), fields(user_id = %request.user_id, action_type = %request.action_type))]
    pub async fn handle_action(&self, request: ActionRequest) -> Result<ActionOutcome> {
        let action_type = request.action_type;
        let started = Instant::now();

        let result = self.handle_action_inner(request).await;

        let status = match &result {
            Ok(outcome) if outcome.pending_reconciliation => "partial",
            Ok(_) => "success",
            Err(_) => "error",
        };
        metrics::record_action_duration(
            action_type.as_str(),
            status,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn handle_action_inner(&self, request: ActionRequest) -> Result<ActionOutcome> {
        let ActionRequest {
            user_id,
            action_type,
            metadata,
            event_id,
        } = request;

        validate_user_id(&user_id)?;
        if action_type.is_unlock_bonus() {
            return Err(RewardError::Validation(
                "解锁奖励只能由成就评估发放".to_string(),
            ));
        }
        let nonce = match event_id {
            Some(id) if id.trim().is_empty() => {
                return Err(RewardError::Validation("eventId 不能为空".to_string()));
            }
            Some(id) => id,
            None => Uuid::now_v7().to_string(),
        };

        // 1. 入账
        let key = IdempotencyKey::derive(&user_id, action_type, &nonce);
        let receipt = self.ledger.award(&user_id, action_type, metadata, &key).await?;
        let mut outcome = ActionOutcome::from_receipt(&user_id, &receipt);

        // 2-3. 评估并结算解锁
        match self.evaluator.evaluate(&user_id).await {
            Ok(report) => {
                let settlement = self.settle_unlocks(&user_id, report.unlocks).await;
                outcome.unlocks.extend(settlement.unlocks);
                outcome.bonus_credits += settlement.bonus_credits;
                if settlement.failed || !report.deferred.is_empty() {
                    outcome.pending_reconciliation = true;
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "成就评估失败，积分已入账，等待对账");
                outcome.pending_reconciliation = true;
                return Ok(outcome);
            }
        }

        // 4. 复核
        match self.evaluator.evaluate(&user_id).await {
            Ok(report) if report.unlocks.is_empty() => {
                if !report.deferred.is_empty() {
                    outcome.pending_reconciliation = true;
                }
            }
            Ok(report) => {
                // 只可能来自同一用户的并发行为，本次 CAS 胜出则由本次结算
                warn!(
                    user_id = %user_id,
                    unlock_count = report.unlocks.len(),
                    "复核评估发现并发解锁，直接结算"
                );
                let settlement = self.settle_unlocks(&user_id, report.unlocks).await;
                outcome.unlocks.extend(settlement.unlocks);
                outcome.bonus_credits += settlement.bonus_credits;
                if settlement.failed || !report.deferred.is_empty() {
                    outcome.pending_reconciliation = true;
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "复核评估失败，等待对账");
                outcome.pending_reconciliation = true;
            }
        }

        info!(
            user_id = %user_id,
            credits = outcome.credits_granted,
            bonus_credits = outcome.bonus_credits,
            unlock_count = outcome.unlocks.len(),
            replayed = outcome.replayed,
            "行为处理完成"
        );
        Ok(outcome)
    }

    /// 逐个通知解锁并发放解锁奖励
    async fn settle_unlocks(&self, user_id: &str, unlocks: Vec<AchievementUnlock>) -> Settlement {
        let mut settlement = Settlement::default();

        for unlock in unlocks {
            self.notifier
                .achievement_unlocked(user_id, unlock.category, unlock.level)
                .await;

            match self
                .ledger
                .award(
                    user_id,
                    ActionType::AchievementUnlock,
                    Some(unlock_metadata(&unlock)),
                    &IdempotencyKey::for_unlock(user_id, unlock.category, unlock.level),
                )
                .await
            {
                Ok(receipt) => {
                    if !receipt.replayed {
                        settlement.bonus_credits += receipt.credits;
                    }
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        category = %unlock.category,
                        level = unlock.level,
                        error = %e,
                        "解锁奖励发放失败，等待对账"
                    );
                    settlement.failed = true;
                }
            }
            settlement.unlocks.push(unlock);
        }

        settlement
    }

    /// 查询余额
    pub async fn get_balance(&self, user_id: &str) -> Result<BalanceView> {
        let state = self.load_state(user_id).await?;
        Ok(BalanceView {
            user_id: state.user_id,
            balance: state.balance,
            lifetime: state.lifetime,
        })
    }

    /// 查询全部分类的成就进度
    pub async fn get_achievements(&self, user_id: &str) -> Result<Vec<AchievementProgress>> {
        let state = self.load_state(user_id).await?;
        Ok(AchievementCategory::ALL
            .into_iter()
            .map(|category| {
                let level = state.level(category);
                AchievementProgress {
                    category,
                    level,
                    level_count: self.rules.level_count(category),
                    counter: state.counter(category.counter_action()),
                    next_threshold: self.rules.next_threshold(category, level),
                }
            })
            .collect())
    }

    /// 按时间倒序查询流水
    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>> {
        if !(1..=MAX_TRANSACTION_PAGE).contains(&limit) {
            return Err(RewardError::Validation(format!(
                "limit 必须在 1 到 {} 之间",
                MAX_TRANSACTION_PAGE
            )));
        }
        if !self.store.user_exists(user_id).await? {
            return Err(RewardError::UserNotFound(user_id.to_string()));
        }
        self.store.list_transactions(user_id, limit).await
    }

    /// 对账
    ///
    /// 为每个已记录的成就等级补发解锁奖励（确定性幂等键，已发放的只会重放），
    /// 再执行一次评估并结算新解锁。可在任意部分失败之后重复执行。
    #[instrument(skip(self))]
    pub async fn reconcile(&self, user_id: &str) -> Result<ReconcileOutcome> {
        let state = self.load_state(user_id).await?;
        let mut outcome = ReconcileOutcome {
            user_id: user_id.to_string(),
            ..Default::default()
        };

        for category in AchievementCategory::ALL {
            let thresholds = self.rules.thresholds(category);
            let recorded = state.level(category);
            if recorded as usize > thresholds.len() {
                // 规则表缩短前写入的等级，超出部分没有门槛可对应
                warn!(
                    user_id = %user_id,
                    category = %category,
                    recorded,
                    level_count = thresholds.len(),
                    "已记录等级超出当前门槛表，跳过超出部分"
                );
            }
            for (index, &threshold) in thresholds.iter().take(recorded as usize).enumerate() {
                let unlock = AchievementUnlock {
                    category,
                    level: index as u32 + 1,
                    threshold,
                };
                let level = unlock.level;
                let receipt = self
                    .ledger
                    .record(
                        user_id,
                        ActionType::AchievementUnlock,
                        Some(unlock_metadata(&unlock)),
                        &IdempotencyKey::for_unlock(user_id, category, level),
                    )
                    .await?;
                if !receipt.replayed {
                    self.notifier
                        .achievement_unlocked(user_id, category, level)
                        .await;
                    self.ledger.notify(user_id, &receipt).await;
                    outcome.bonuses_reissued += 1;
                    outcome.bonus_credits += receipt.credits;
                }
            }
        }

        let report = self.evaluator.evaluate(user_id).await?;
        let settlement = self.settle_unlocks(user_id, report.unlocks).await;
        if settlement.failed {
            return Err(RewardError::Internal(format!(
                "用户 {} 的解锁奖励补发未完成",
                user_id
            )));
        }
        outcome.unlocks = settlement.unlocks;
        outcome.bonus_credits += settlement.bonus_credits;
        outcome.deferred = report.deferred;

        info!(
            user_id = %user_id,
            bonuses_reissued = outcome.bonuses_reissued,
            new_unlocks = outcome.unlocks.len(),
            "对账完成"
        );
        Ok(outcome)
    }

    async fn load_state(&self, user_id: &str) -> Result<UserRewardState> {
        self.store
            .get_user_reward_state(user_id)
            .await?
            .ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(RewardError::Validation("userId 不能为空".to_string()));
    }
    if user_id.len() > 128 {
        return Err(RewardError::Validation("userId 长度不能超过 128".to_string()));
    }
    Ok(())
}

fn unlock_metadata(unlock: &AchievementUnlock) -> serde_json::Value {
    json!({
        "category": unlock.category,
        "level": unlock.level,
        "threshold": unlock.threshold,
    })
}
