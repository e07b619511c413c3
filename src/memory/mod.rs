//! 记忆层：Agent 工作记忆（待处理队列、去重集合、时间戳）

pub mod working;

pub use working::{MemoryValue, WorkingMemory};
