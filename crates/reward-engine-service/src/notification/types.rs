//! 奖励事件类型

use serde::{Deserialize, Serialize};

use crate::models::{AchievementCategory, ActionType};

/// 面向用户展示的奖励事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardEvent {
    #[serde(rename_all = "camelCase")]
    CreditsAwarded {
        user_id: String,
        amount: i64,
        action_type: ActionType,
    },
    #[serde(rename_all = "camelCase")]
    AchievementUnlocked {
        user_id: String,
        category: AchievementCategory,
        level: u32,
    },
}

impl RewardEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CreditsAwarded { .. } => "credits_awarded",
            Self::AchievementUnlocked { .. } => "achievement_unlocked",
        }
    }
}
