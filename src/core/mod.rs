//! 核心层：错误与恢复、状态投影、任务调度、多 Agent 监管、优雅关闭

pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod task_scheduler;

pub use error::{AgentError, LoadFailure, ProviderError, RecoveryAction, ValidationError};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason, SupervisorCleanup};
pub use state::{AgentPhase, AgentStatus, CycleOutcome};
pub use supervisor::{AgentSupervisor, LoadReport, StopOutcome, SupervisorConfig};
pub use task_scheduler::{select_task, HourClock, HourWindow, TaskCategory, TaskSelection, WeightedTask};
