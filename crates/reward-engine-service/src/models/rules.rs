//! 静态奖励规则
//!
//! 积分费率表与成就门槛表在进程启动时加载并校验，此后不可变。
//! 配置形态（`RewardRulesConfig`）使用条目列表，校验后转换为按固定槽位索引的 `RewardRules`。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::enums::{AchievementCategory, ActionType};
use crate::error::{Result, RewardError};

/// 单个行为的积分费率
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub action_type: ActionType,
    pub credits: i64,
}

/// 单个成就分类的门槛序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub category: AchievementCategory,
    pub levels: Vec<u64>,
}

/// 奖励规则配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardRulesConfig {
    pub rates: Vec<RateEntry>,
    pub thresholds: Vec<ThresholdEntry>,
    /// 成就等级 CAS 冲突时的最大尝试次数
    pub max_cas_retries: u32,
    /// 单次通知的超时时间（毫秒）
    pub notification_timeout_ms: u64,
}

impl Default for RewardRulesConfig {
    fn default() -> Self {
        RewardRules::standard().to_config()
    }
}

/// 已校验的奖励规则
///
/// 费率与门槛按枚举槽位存放，查询不会失败
#[derive(Debug, Clone)]
pub struct RewardRules {
    rates: [i64; ActionType::COUNT],
    thresholds: [Vec<u64>; AchievementCategory::COUNT],
    max_cas_retries: u32,
    notification_timeout: Duration,
}

impl RewardRules {
    /// 平台默认规则
    pub fn standard() -> Self {
        let mut rates = [0; ActionType::COUNT];
        rates[ActionType::CreatePost.slot()] = 10;
        rates[ActionType::CreateComment.slot()] = 2;
        rates[ActionType::EnrollCourse.slot()] = 5;
        rates[ActionType::CompleteCourse.slot()] = 50;
        rates[ActionType::DailyLogin.slot()] = 1;
        rates[ActionType::PaymentGrant.slot()] = 100;
        rates[ActionType::AchievementUnlock.slot()] = 25;

        let mut thresholds: [Vec<u64>; AchievementCategory::COUNT] =
            std::array::from_fn(|_| Vec::new());
        thresholds[AchievementCategory::Posts.slot()] = vec![1, 5, 10, 25, 50, 100];
        thresholds[AchievementCategory::Comments.slot()] = vec![1, 10, 50, 100, 250];
        thresholds[AchievementCategory::CoursesEnrolled.slot()] = vec![1, 3, 5, 10, 20];
        thresholds[AchievementCategory::CoursesCompleted.slot()] = vec![1, 3, 5, 10, 25];
        thresholds[AchievementCategory::Logins.slot()] = vec![1, 7, 30, 100, 365];

        Self {
            rates,
            thresholds,
            max_cas_retries: 3,
            notification_timeout: Duration::from_millis(2000),
        }
    }

    /// 从配置构建并校验
    ///
    /// 要求：每个行为恰好一个非负费率；每个分类恰好一组非空、严格递增、从 1 起的门槛；
    /// CAS 尝试次数至少为 1。
    pub fn from_config(config: &RewardRulesConfig) -> Result<Self> {
        let mut rates: [Option<i64>; ActionType::COUNT] = [None; ActionType::COUNT];
        for entry in &config.rates {
            if entry.credits < 0 {
                return Err(RewardError::Configuration(format!(
                    "{} 的积分费率不能为负数: {}",
                    entry.action_type, entry.credits
                )));
            }
            let slot = &mut rates[entry.action_type.slot()];
            if slot.is_some() {
                return Err(RewardError::Configuration(format!(
                    "{} 的积分费率重复配置",
                    entry.action_type
                )));
            }
            *slot = Some(entry.credits);
        }

        let mut resolved_rates = [0; ActionType::COUNT];
        for action in ActionType::ALL {
            resolved_rates[action.slot()] = rates[action.slot()].ok_or_else(|| {
                RewardError::Configuration(format!("缺少 {} 的积分费率", action))
            })?;
        }

        let mut thresholds: [Option<Vec<u64>>; AchievementCategory::COUNT] =
            std::array::from_fn(|_| None);
        for entry in &config.thresholds {
            validate_thresholds(entry)?;
            let slot = &mut thresholds[entry.category.slot()];
            if slot.is_some() {
                return Err(RewardError::Configuration(format!(
                    "{} 的成就门槛重复配置",
                    entry.category
                )));
            }
            *slot = Some(entry.levels.clone());
        }

        let mut resolved_thresholds: [Vec<u64>; AchievementCategory::COUNT] =
            std::array::from_fn(|_| Vec::new());
        for category in AchievementCategory::ALL {
            resolved_thresholds[category.slot()] =
                thresholds[category.slot()].take().ok_or_else(|| {
                    RewardError::Configuration(format!("缺少 {} 的成就门槛", category))
                })?;
        }

        if config.max_cas_retries == 0 {
            return Err(RewardError::Configuration(
                "max_cas_retries 至少为 1".to_string(),
            ));
        }

        Ok(Self {
            rates: resolved_rates,
            thresholds: resolved_thresholds,
            max_cas_retries: config.max_cas_retries,
            notification_timeout: Duration::from_millis(config.notification_timeout_ms),
        })
    }

    /// 导出为配置形态
    pub fn to_config(&self) -> RewardRulesConfig {
        RewardRulesConfig {
            rates: ActionType::ALL
                .into_iter()
                .map(|action_type| RateEntry {
                    action_type,
                    credits: self.rate(action_type),
                })
                .collect(),
            thresholds: AchievementCategory::ALL
                .into_iter()
                .map(|category| ThresholdEntry {
                    category,
                    levels: self.thresholds(category).to_vec(),
                })
                .collect(),
            max_cas_retries: self.max_cas_retries,
            notification_timeout_ms: self.notification_timeout.as_millis() as u64,
        }
    }

    /// 行为对应的固定积分
    pub fn rate(&self, action_type: ActionType) -> i64 {
        self.rates[action_type.slot()]
    }

    /// 成就解锁奖励积分
    pub fn unlock_bonus(&self) -> i64 {
        self.rate(ActionType::AchievementUnlock)
    }

    /// 分类的升序门槛序列
    pub fn thresholds(&self, category: AchievementCategory) -> &[u64] {
        &self.thresholds[category.slot()]
    }

    /// 分类的等级总数
    pub fn level_count(&self, category: AchievementCategory) -> u32 {
        self.thresholds(category).len() as u32
    }

    /// 计数可达到的最高等级
    ///
    /// 等级 k 在 `count >= thresholds[k-1]` 时解锁
    pub fn level_for(&self, category: AchievementCategory, count: u64) -> u32 {
        self.thresholds(category)
            .iter()
            .take_while(|&&threshold| count >= threshold)
            .count() as u32
    }

    /// 下一个尚未达到的门槛
    pub fn next_threshold(&self, category: AchievementCategory, level: u32) -> Option<u64> {
        self.thresholds(category).get(level as usize).copied()
    }

    pub fn max_cas_retries(&self) -> u32 {
        self.max_cas_retries
    }

    pub fn notification_timeout(&self) -> Duration {
        self.notification_timeout
    }
}

impl Default for RewardRules {
    fn default() -> Self {
        Self::standard()
    }
}

fn validate_thresholds(entry: &ThresholdEntry) -> Result<()> {
    let Some(&first) = entry.levels.first() else {
        return Err(RewardError::Configuration(format!(
            "{} 的成就门槛不能为空",
            entry.category
        )));
    };
    if first == 0 {
        return Err(RewardError::Configuration(format!(
            "{} 的首个门槛必须大于 0",
            entry.category
        )));
    }
    if entry.levels.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(RewardError::Configuration(format!(
            "{} 的成就门槛必须严格递增: {:?}",
            entry.category, entry.levels
        )));
    }
    Ok(())
}
