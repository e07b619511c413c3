//! Hive - 多 Agent 社交调度引擎
//!
//! 模块划分：
//! - **actions**: 任务 Handler 与动作注册表（发帖、回复、点赞、提及、消息回复）
//! - **agent**: Agent 定义校验、运行时状态、主循环
//! - **capability**: 能力提供者接口、按名称路由、超时与审计、Mock 连接
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、任务调度、多 Agent 监管、优雅关闭
//! - **memory**: 每个 Agent 的工作记忆（时间线队列、去重集合、时间戳）
//! - **observability**: 日志初始化

pub mod actions;
pub mod agent;
pub mod capability;
pub mod config;
pub mod core;
pub mod memory;
pub mod observability;
