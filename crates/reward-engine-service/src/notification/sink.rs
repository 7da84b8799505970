//! 通知接收方
//!
//! 默认实现只写日志；`ChannelNotificationSink` 把事件转发到进程内通道，
//! 供推送网关等下游消费，也用于测试中断言事件顺序。

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use super::types::RewardEvent;
use crate::error::{Result, RewardError};
use crate::models::{AchievementCategory, ActionType};

/// 通知接收方接口
///
/// 至少一次投递，不要求确认
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn on_credits_awarded(
        &self,
        user_id: &str,
        amount: i64,
        action_type: ActionType,
    ) -> Result<()>;

    async fn on_achievement_unlocked(
        &self,
        user_id: &str,
        category: AchievementCategory,
        level: u32,
    ) -> Result<()>;
}

/// 日志通知
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn on_credits_awarded(
        &self,
        user_id: &str,
        amount: i64,
        action_type: ActionType,
    ) -> Result<()> {
        info!(user_id = %user_id, amount, action_type = %action_type, "积分到账通知");
        Ok(())
    }

    async fn on_achievement_unlocked(
        &self,
        user_id: &str,
        category: AchievementCategory,
        level: u32,
    ) -> Result<()> {
        info!(user_id = %user_id, category = %category, level, "成就解锁通知");
        Ok(())
    }
}

/// 通道通知
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<RewardEvent>,
}

impl ChannelNotificationSink {
    pub fn new(sender: mpsc::UnboundedSender<RewardEvent>) -> Self {
        Self { sender }
    }

    /// 创建接收方及其事件接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RewardEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn forward(&self, event: RewardEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|e| RewardError::NotificationFailure(format!("事件通道已关闭: {}", e)))
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn on_credits_awarded(
        &self,
        user_id: &str,
        amount: i64,
        action_type: ActionType,
    ) -> Result<()> {
        self.forward(RewardEvent::CreditsAwarded {
            user_id: user_id.to_string(),
            amount,
            action_type,
        })
    }

    async fn on_achievement_unlocked(
        &self,
        user_id: &str,
        category: AchievementCategory,
        level: u32,
    ) -> Result<()> {
        self.forward(RewardEvent::AchievementUnlocked {
            user_id: user_id.to_string(),
            category,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelNotificationSink::channel();
        sink.on_credits_awarded("u1", 10, ActionType::CreatePost)
            .await
            .unwrap();
        sink.on_achievement_unlocked("u1", AchievementCategory::Posts, 1)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type(), "credits_awarded");
        assert_eq!(rx.recv().await.unwrap().event_type(), "achievement_unlocked");
    }

    #[tokio::test]
    async fn test_closed_channel_reports_notification_failure() {
        let (sink, rx) = ChannelNotificationSink::channel();
        drop(rx);

        let err = sink
            .on_credits_awarded("u1", 10, ActionType::CreatePost)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::NotificationFailure(_)));
    }
}
