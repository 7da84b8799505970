//! 奖励存储层
//!
//! 提供持久化端口 [`RewardStore`] 及其两个适配器。
//!
//! ## 设计原则
//!
//! - 存储只负责数据持久化，不包含业务逻辑
//! - 追加流水与累加计数是一个原子单元，成就等级只通过 CAS 更新
//! - 不持有跨调用的应用层锁，同一用户的并发写入由存储原语串行化

mod memory_repo;
mod pg_repo;
mod traits;

pub use memory_repo::MemoryRewardStore;
pub use pg_repo::PgRewardStore;
pub use traits::*;
