//! 通知分发器
//!
//! 在调用方任务内按顺序投递，每次投递带超时。
//! 失败与超时只记录日志并吞掉，账本状态此时已经持久化。

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::sink::NotificationSink;
use crate::models::{AchievementCategory, ActionType};

/// 通知分发器
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// 积分到账
    pub async fn credits_awarded(&self, user_id: &str, amount: i64, action_type: ActionType) {
        let delivery = self.sink.on_credits_awarded(user_id, amount, action_type);
        match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                user_id = %user_id,
                action_type = %action_type,
                error = %e,
                "积分通知发送失败，已忽略"
            ),
            Err(_) => warn!(
                user_id = %user_id,
                action_type = %action_type,
                timeout_ms = self.timeout.as_millis() as u64,
                "积分通知发送超时，已忽略"
            ),
        }
    }

    /// 成就解锁
    pub async fn achievement_unlocked(
        &self,
        user_id: &str,
        category: AchievementCategory,
        level: u32,
    ) {
        let delivery = self.sink.on_achievement_unlocked(user_id, category, level);
        match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                user_id = %user_id,
                category = %category,
                level,
                error = %e,
                "成就通知发送失败，已忽略"
            ),
            Err(_) => warn!(
                user_id = %user_id,
                category = %category,
                level,
                timeout_ms = self.timeout.as_millis() as u64,
                "成就通知发送超时，已忽略"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RewardError;
    use crate::notification::MockNotificationSink;

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let mut sink = MockNotificationSink::new();
        sink.expect_on_credits_awarded()
            .times(1)
            .returning(|_, _, _| Err(RewardError::NotificationFailure("push down".to_string())));
        sink.expect_on_achievement_unlocked()
            .times(1)
            .returning(|_, _, _| Err(RewardError::NotificationFailure("push down".to_string())));

        let dispatcher = NotificationDispatcher::new(Arc::new(sink), Duration::from_millis(100));
        dispatcher
            .credits_awarded("u1", 10, ActionType::CreatePost)
            .await;
        dispatcher
            .achievement_unlocked("u1", AchievementCategory::Posts, 1)
            .await;
    }

    #[tokio::test]
    async fn test_delivery_passes_arguments() {
        let mut sink = MockNotificationSink::new();
        sink.expect_on_achievement_unlocked()
            .withf(|user_id, category, level| {
                user_id == "u1" && *category == AchievementCategory::Logins && *level == 3
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = NotificationDispatcher::new(Arc::new(sink), Duration::from_millis(100));
        dispatcher
            .achievement_unlocked("u1", AchievementCategory::Logins, 3)
            .await;
    }
}
