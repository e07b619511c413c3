//! 错误恢复引擎
//!
//! 根据周期结果返回节奏（RecoveryAction），保证单个周期的失败永远不会终止 Agent 循环：
//! - 成功：loop_delay
//! - 无事可做 / Provider 失败或超时 / 无可选任务：fallback 间隔
//! - 其它未处理错误（Handler 崩溃、初始化失败等）：loop_delay

use std::time::Duration;

use crate::core::{AgentError, CycleOutcome, RecoveryAction};

/// fallback 至少比 loop_delay 长出的时间
const FALLBACK_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    fallback_interval: Duration,
}

impl RecoveryEngine {
    pub fn new(fallback_interval: Duration) -> Self {
        Self { fallback_interval }
    }

    /// fallback 总是长于 loop_delay
    fn fallback(&self, loop_delay: Duration) -> RecoveryAction {
        RecoveryAction::Fallback(
            self.fallback_interval
                .max(loop_delay.saturating_add(FALLBACK_MARGIN)),
        )
    }

    pub fn handle(&self, err: &AgentError, loop_delay: Duration) -> RecoveryAction {
        match err {
            AgentError::Provider(_) | AgentError::NoSelectableTask => self.fallback(loop_delay),
            _ => RecoveryAction::LoopDelay(loop_delay),
        }
    }

    pub fn pacing(&self, outcome: &CycleOutcome, loop_delay: Duration) -> RecoveryAction {
        match outcome {
            CycleOutcome::Succeeded { .. } => RecoveryAction::LoopDelay(loop_delay),
            CycleOutcome::NoOp { .. } => self.fallback(loop_delay),
            CycleOutcome::Failed { error, .. } => self.handle(error, loop_delay),
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
