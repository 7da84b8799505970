//! 通知模块
//!
//! 奖励事件在持久化成功之后才投递给通知接收方。
//! 投递失败只记录日志，不影响账本结果。

mod dispatcher;
mod sink;
mod types;

pub use dispatcher::NotificationDispatcher;
pub use sink::{ChannelNotificationSink, LogNotificationSink, NotificationSink};
#[cfg(test)]
pub use sink::MockNotificationSink;
pub use types::RewardEvent;
