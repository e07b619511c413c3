//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：配置类错误（校验失败、未知任务/Agent、重复启动）同步返回给调用方；
//! 循环内错误（Provider 失败、无可选任务、Handler 崩溃）由 RecoveryEngine 转为退避节奏。

use std::time::Duration;

use thiserror::Error;

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid agent definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Duplicate action registration: {0}")]
    DuplicateAction(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent {0} is already running")]
    AlreadyRunning(String),

    #[error("Agent {0} is not running")]
    NotRunning(String),

    /// load 输入为空，或全部定义校验失败；携带每条失败原因
    #[error("No valid agents ({} rejected)", .0.len())]
    NoValidAgents(Vec<LoadFailure>),

    /// 调整后所有权重为 0
    #[error("No selectable task: all effective weights are zero")]
    NoSelectableTask,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Handler 内未处理的异常（含 panic）
    #[error("Handler fault in {task}: {message}")]
    HandlerFault { task: String, message: String },

    #[error("Setup failed: {0}")]
    Setup(String),

    /// 补货 / 选择阶段的 panic，仅中止当前周期
    #[error("Cycle aborted: {0}")]
    CyclePanic(String),
}

/// Agent 定义校验错误（加载时立即暴露，必填字段从不默认）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("definition must be a JSON object")]
    NotAnObject,

    #[error("malformed definition: {0}")]
    Malformed(String),

    #[error("agent has no tasks")]
    NoTasks,

    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' has invalid weight {weight}")]
    InvalidWeight { task: String, weight: f64 },

    #[error("all task weights are zero")]
    AllWeightsZero,

    #[error("invalid hour window {start}..={end}")]
    InvalidHourWindow { start: u8, end: u8 },

    #[error("invalid multiplier '{name}': {value}")]
    InvalidMultiplier { name: String, value: f64 },

    #[error("task '{0}' has no registered handler")]
    UnregisteredTask(String),
}

/// 外部能力调用错误（失败或超时），对调度器不透明
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider '{0}' is not configured")]
    Unavailable(String),

    #[error("{provider}/{operation} failed: {message}")]
    Failed {
        provider: String,
        operation: String,
        message: String,
    },

    #[error("{provider}/{operation} timed out after {timeout_ms}ms")]
    Timeout {
        provider: String,
        operation: String,
        timeout_ms: u64,
    },
}

/// load 中被拒绝的单条定义：名称（无名称时为 `#序号`）与原因
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub name: String,
    pub reason: String,
}

/// 恢复引擎根据周期结果给出的节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 按配置的 loop_delay 进入下一周期
    LoopDelay(Duration),
    /// 无事可做或 Handler 失败：较长的退避间隔，避免空转
    Fallback(Duration),
}

impl RecoveryAction {
    pub fn delay(&self) -> Duration {
        match self {
            Self::LoopDelay(d) | Self::Fallback(d) => *d,
        }
    }
}
