//! 服务层
//!
//! 积分账本、成就评估器与触发协调器

mod achievement;
mod coordinator;
pub mod dto;
mod ledger;

pub use achievement::AchievementEvaluator;
pub use coordinator::{MAX_TRANSACTION_PAGE, TriggerCoordinator};
pub use dto::*;
pub use ledger::CreditLedger;
