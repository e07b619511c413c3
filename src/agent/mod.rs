//! Agent：定义、运行时状态与主循环
//!
//! - **definition**: 定义记录的校验与类型化
//! - **loader**: 从 JSON 文件读取原始定义
//! - **prompt**: 由人设拼装系统提示词
//! - **routing**: `Name!! text` 寻址消息
//! - **runner**: 补货 -> 选择 -> 分发 -> 节奏 的主循环
//! - **runtime**: 每个 Agent 独占的可变状态

pub mod definition;
pub mod loader;
pub mod prompt;
pub mod routing;
pub mod runner;
pub mod runtime;

pub use definition::{
    record_label, AgentDefinition, ConnectionConfig, Persona, TaskDefinition, TimeMultipliers,
};
pub use loader::{load_definitions_file, parse_definitions};
pub use prompt::build_system_prompt;
pub use routing::{parse_addressed_message, resolve_target};
pub use runner::{dispatch_task, AgentRunner, RunnerConfig};
pub use runtime::{AgentRuntime, PlatformIdentity};
