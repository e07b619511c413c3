//! 状态定义：Agent 生命周期阶段与对外快照
//!
//! 执行上下文通过 watch 通道发布 AgentPhase；监管者只读，用于状态展示。

use serde::Serialize;

/// Agent 生命周期阶段
///
/// `Uninitialized -> Ready`（一次性初始化成功）`-> Running -> (Running | Backoff) -> Stopped`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Uninitialized,
    Ready,
    Running,
    Backoff,
    Stopped,
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// 单个周期的结果
#[derive(Debug)]
pub enum CycleOutcome {
    /// Handler 报告成功
    Succeeded { task: String },
    /// Handler 报告无事可做（非错误）
    NoOp { task: String },
    /// 周期在补货 / 选择 / 分发中失败
    Failed { task: Option<String>, error: crate::core::AgentError },
}

impl CycleOutcome {
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Succeeded { task } | Self::NoOp { task } => Some(task),
            Self::Failed { task, .. } => task.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// 监管者对外的 Agent 快照
#[derive(Clone, Debug, Serialize)]
pub struct AgentStatus {
    pub name: String,
    pub phase: AgentPhase,
    pub running: bool,
    /// 当前执行上下文的运行 ID（未运行时为 None）
    pub run_id: Option<String>,
}
