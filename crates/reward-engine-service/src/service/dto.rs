//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与内部领域模型解耦

use serde::{Deserialize, Serialize};

use crate::models::{AchievementCategory, ActionType};

/// 用户行为请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub user_id: String,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// 调用方提供的事件 ID，作为幂等键的因果 nonce；缺省时生成 UUID v7
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ActionRequest {
    pub fn new(user_id: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            user_id: user_id.into(),
            action_type,
            metadata: None,
            event_id: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// 单次入账回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardReceipt {
    pub transaction_id: String,
    pub action_type: ActionType,
    pub credits: i64,
    /// 幂等重放：流水早已存在，本次未改变状态
    pub replayed: bool,
}

/// 新解锁的成就等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub category: AchievementCategory,
    pub level: u32,
    pub threshold: u64,
}

/// 一次成就评估的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// 本次 CAS 成功写入的全部新等级，按分类、等级升序
    pub unlocks: Vec<AchievementUnlock>,
    /// 重试耗尽后推迟的分类
    pub deferred: Vec<AchievementCategory>,
}

impl EvaluationReport {
    pub fn is_empty(&self) -> bool {
        self.unlocks.is_empty() && self.deferred.is_empty()
    }
}

/// 行为处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub user_id: String,
    pub transaction_id: String,
    /// 行为本身获得的积分（重放时为原始发放值）
    pub credits_granted: i64,
    pub replayed: bool,
    pub unlocks: Vec<AchievementUnlock>,
    /// 本次新发放的解锁奖励积分合计
    pub bonus_credits: i64,
    /// 评估或解锁奖励未完成，需要后续对账补齐
    pub pending_reconciliation: bool,
}

impl ActionOutcome {
    pub fn from_receipt(user_id: &str, receipt: &AwardReceipt) -> Self {
        Self {
            user_id: user_id.to_string(),
            transaction_id: receipt.transaction_id.clone(),
            credits_granted: receipt.credits,
            replayed: receipt.replayed,
            unlocks: Vec::new(),
            bonus_credits: 0,
            pending_reconciliation: false,
        }
    }
}

/// 余额视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub user_id: String,
    pub balance: i64,
    pub lifetime: i64,
}

/// 单个分类的成就进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub category: AchievementCategory,
    pub level: u32,
    pub level_count: u32,
    pub counter: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_threshold: Option<u64>,
}

/// 对账结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub user_id: String,
    /// 对账过程中新解锁的等级
    pub unlocks: Vec<AchievementUnlock>,
    /// 补发的解锁奖励笔数
    pub bonuses_reissued: u32,
    pub bonus_credits: i64,
    pub deferred: Vec<AchievementCategory>,
}
