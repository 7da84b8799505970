//! 奖励服务枚举类型定义
//!
//! 行为类型与成就分类都是封闭枚举，每个成员映射到固定的计数槽位。
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 用户行为类型
///
/// 每种行为按静态费率表获得固定积分
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// 发布帖子
    CreatePost,
    /// 发表评论
    CreateComment,
    /// 报名课程
    EnrollCourse,
    /// 完成课程
    CompleteCourse,
    /// 每日登录
    DailyLogin,
    /// 支付完成后的积分发放
    PaymentGrant,
    /// 成就解锁奖励（不参与任何门槛计数）
    AchievementUnlock,
}

impl ActionType {
    pub const COUNT: usize = 7;

    pub const ALL: [ActionType; Self::COUNT] = [
        Self::CreatePost,
        Self::CreateComment,
        Self::EnrollCourse,
        Self::CompleteCourse,
        Self::DailyLogin,
        Self::PaymentGrant,
        Self::AchievementUnlock,
    ];

    /// 固定槽位下标
    pub const fn slot(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePost => "CREATE_POST",
            Self::CreateComment => "CREATE_COMMENT",
            Self::EnrollCourse => "ENROLL_COURSE",
            Self::CompleteCourse => "COMPLETE_COURSE",
            Self::DailyLogin => "DAILY_LOGIN",
            Self::PaymentGrant => "PAYMENT_GRANT",
            Self::AchievementUnlock => "ACHIEVEMENT_UNLOCK",
        }
    }

    /// 是否为成就解锁奖励
    pub const fn is_unlock_bonus(self) -> bool {
        matches!(self, Self::AchievementUnlock)
    }

    /// 是否累加行为计数
    ///
    /// 解锁奖励不计数，保证奖励发放永远不会再次跨越门槛
    pub const fn is_counted(self) -> bool {
        !self.is_unlock_bonus()
    }

    /// 该行为驱动的成就分类
    pub const fn category(self) -> Option<AchievementCategory> {
        match self {
            Self::CreatePost => Some(AchievementCategory::Posts),
            Self::CreateComment => Some(AchievementCategory::Comments),
            Self::EnrollCourse => Some(AchievementCategory::CoursesEnrolled),
            Self::CompleteCourse => Some(AchievementCategory::CoursesCompleted),
            Self::DailyLogin => Some(AchievementCategory::Logins),
            Self::PaymentGrant | Self::AchievementUnlock => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown action type: {}", s))
    }
}

/// 成就分类
///
/// 每个分类跟踪一个行为计数，并配置一组升序门槛
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementCategory {
    Posts,
    Comments,
    CoursesEnrolled,
    CoursesCompleted,
    Logins,
}

impl AchievementCategory {
    pub const COUNT: usize = 5;

    pub const ALL: [AchievementCategory; Self::COUNT] = [
        Self::Posts,
        Self::Comments,
        Self::CoursesEnrolled,
        Self::CoursesCompleted,
        Self::Logins,
    ];

    /// 固定槽位下标
    pub const fn slot(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Posts => "POSTS",
            Self::Comments => "COMMENTS",
            Self::CoursesEnrolled => "COURSES_ENROLLED",
            Self::CoursesCompleted => "COURSES_COMPLETED",
            Self::Logins => "LOGINS",
        }
    }

    /// 该分类读取的行为计数
    pub const fn counter_action(self) -> ActionType {
        match self {
            Self::Posts => ActionType::CreatePost,
            Self::Comments => ActionType::CreateComment,
            Self::CoursesEnrolled => ActionType::EnrollCourse,
            Self::CoursesCompleted => ActionType::CompleteCourse,
            Self::Logins => ActionType::DailyLogin,
        }
    }
}

impl fmt::Display for AchievementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown achievement category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_serialization() {
        let json = serde_json::to_string(&ActionType::CreatePost).unwrap();
        assert_eq!(json, "\"CREATE_POST\"");

        let parsed: ActionType = serde_json::from_str("\"ACHIEVEMENT_UNLOCK\"").unwrap();
        assert_eq!(parsed, ActionType::AchievementUnlock);
    }

    #[test]
    fn test_slots_are_dense() {
        for (idx, action) in ActionType::ALL.iter().enumerate() {
            assert_eq!(action.slot(), idx);
        }
        for (idx, category) in AchievementCategory::ALL.iter().enumerate() {
            assert_eq!(category.slot(), idx);
        }
    }

    #[test]
    fn test_unlock_bonus_is_not_counted() {
        assert!(!ActionType::AchievementUnlock.is_counted());
        assert!(ActionType::AchievementUnlock.category().is_none());
        assert!(ActionType::PaymentGrant.is_counted());
    }

    #[test]
    fn test_category_round_trips_through_counter_action() {
        for category in AchievementCategory::ALL {
            assert_eq!(category.counter_action().category(), Some(category));
        }
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("create_post".parse::<ActionType>(), Ok(ActionType::CreatePost));
        assert_eq!(
            "courses_completed".parse::<AchievementCategory>(),
            Ok(AchievementCategory::CoursesCompleted)
        );
        assert!("LIKE".parse::<ActionType>().is_err());
    }
}
