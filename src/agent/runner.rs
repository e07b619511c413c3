//! Agent 主循环
//!
//! 每个周期：一次性初始化（幂等）-> 补货 -> 选择任务 -> 分发 Handler -> 按结果决定节奏。
//! 周期内任何错误（含 Handler panic）只记录日志并转为等待，循环仅在收到取消信号时退出；
//! 取消是协作式的：在周期之间检查，正在进行的能力调用不会被打断。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionContext, ActionRegistry};
use crate::agent::{AgentDefinition, AgentRuntime};
use crate::capability::CapabilityExecutor;
use crate::core::task_scheduler::{
    select_task, HourClock, LocalClock, MultiplierRule, WeightedTask,
};
use crate::core::{AgentError, AgentPhase, CycleOutcome, RecoveryEngine};
use crate::memory::MemoryValue;

/// 循环节奏参数（来自 [scheduler] 配置）
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// 无事可做 / Handler 失败后的退避间隔
    pub fallback_interval: Duration,
    /// 首个周期前的等待
    pub startup_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fallback_interval: Duration::from_secs(60),
            startup_delay: Duration::ZERO,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

/// 解析并调用 Handler；panic 被捕获为 HandlerFault
///
/// 自主循环与外部「立即执行某任务」入口共用。
pub async fn dispatch_task(
    registry: &ActionRegistry,
    definition: &AgentDefinition,
    runtime: &mut AgentRuntime,
    capabilities: &CapabilityExecutor,
    task: &str,
    args: &Value,
) -> Result<bool, AgentError> {
    let action = registry.resolve(task)?;
    let mut ctx = ActionContext {
        definition,
        runtime,
        capabilities,
    };
    match AssertUnwindSafe(action.execute(&mut ctx, args))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(AgentError::HandlerFault {
            task: task.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

pub struct AgentRunner {
    definition: Arc<AgentDefinition>,
    runtime: Arc<Mutex<AgentRuntime>>,
    registry: Arc<ActionRegistry>,
    capabilities: CapabilityExecutor,
    recovery: RecoveryEngine,
    startup_delay: Duration,
    clock: Arc<dyn HourClock>,
    rng: StdRng,
    tasks: Vec<WeightedTask>,
    rules: Vec<MultiplierRule>,
    phase_tx: watch::Sender<AgentPhase>,
}

impl AgentRunner {
    pub fn new(
        definition: Arc<AgentDefinition>,
        runtime: Arc<Mutex<AgentRuntime>>,
        registry: Arc<ActionRegistry>,
        capabilities: CapabilityExecutor,
        config: RunnerConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(AgentPhase::Uninitialized);
        Self {
            tasks: definition.weighted_tasks(),
            rules: definition.multipliers.rules(),
            definition,
            runtime,
            registry,
            capabilities,
            recovery: RecoveryEngine::new(config.fallback_interval),
            startup_delay: config.startup_delay,
            clock: Arc::new(LocalClock),
            rng: StdRng::from_entropy(),
            phase_tx,
        }
    }

    /// 注入随机源（测试用固定种子）
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn HourClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> AgentPhase {
        *self.phase_tx.borrow()
    }

    fn set_phase(&self, phase: AgentPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// 补货：数据源对应的缓存为空或不存在时拉取；失败只记录，缓存保持为空，下个周期重试
    async fn replenish(&self, runtime: &mut AgentRuntime) {
        for source in self.registry.inputs_for(&self.definition) {
            if !runtime.memory.is_empty_or_absent(&source.key) {
                continue;
            }
            tracing::info!(agent = %self.definition.name, input = %source.key, "Replenishing input");
            match self
                .capabilities
                .invoke(&source.provider, &source.operation, source.args.clone())
                .await
            {
                Ok(Value::Null) => {}
                Ok(value) => runtime
                    .memory
                    .insert(source.key.clone(), MemoryValue::from_fetched(value)),
                Err(e) => {
                    tracing::warn!(agent = %self.definition.name, input = %source.key, "Replenish failed: {}", e)
                }
            }
        }
    }

    /// 执行单个周期（不含节奏等待）；任何阶段的 panic 都只中止本周期
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let runtime_handle = Arc::clone(&self.runtime);
        let mut runtime = runtime_handle.lock().await;

        match AssertUnwindSafe(self.cycle_steps(&mut runtime))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => CycleOutcome::Failed {
                task: None,
                error: AgentError::CyclePanic(panic_message(panic.as_ref())),
            },
        }
    }

    async fn cycle_steps(&mut self, runtime: &mut AgentRuntime) -> CycleOutcome {
        if let Err(error) = runtime.ensure_initialized(&self.definition, &self.capabilities) {
            return CycleOutcome::Failed { task: None, error };
        }
        if self.phase() == AgentPhase::Uninitialized {
            self.set_phase(AgentPhase::Ready);
        }

        self.replenish(runtime).await;

        let hour = self.clock.current_hour();
        let selection = match select_task(
            &self.tasks,
            self.definition.use_time_based_weights,
            hour,
            &self.rules,
            &mut self.rng,
        ) {
            Ok(selection) => selection,
            Err(error) => return CycleOutcome::Failed { task: None, error },
        };
        tracing::debug!(
            agent = %self.definition.name,
            hour,
            weights = ?selection.weights,
            "Selected task {}",
            selection.name
        );

        let args = self
            .definition
            .task(&selection.name)
            .map(|t| t.args.clone())
            .unwrap_or_default();
        let result = dispatch_task(
            &self.registry,
            &self.definition,
            runtime,
            &self.capabilities,
            &selection.name,
            &args,
        )
        .await;

        match result {
            Ok(true) => CycleOutcome::Succeeded { task: selection.name },
            Ok(false) => CycleOutcome::NoOp { task: selection.name },
            Err(error) => CycleOutcome::Failed {
                task: Some(selection.name),
                error,
            },
        }
    }

    /// 运行直到 cancel 被触发
    pub async fn run(mut self, cancel: CancellationToken) {
        let name = self.definition.name.clone();

        if !self.startup_delay.is_zero() {
            tracing::info!(agent = %name, "Starting loop in {:?}", self.startup_delay);
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_phase(AgentPhase::Stopped);
                    return;
                }
                _ = tokio::time::sleep(self.startup_delay) => {}
            }
        }
        tracing::info!(agent = %name, "Agent loop started");

        while !cancel.is_cancelled() {
            self.set_phase(AgentPhase::Running);
            let outcome = self.run_cycle().await;
            let pacing = self.recovery.pacing(&outcome, self.definition.loop_delay);

            let task = outcome.task().unwrap_or("-");
            match &outcome {
                CycleOutcome::Succeeded { .. } => {
                    tracing::info!(agent = %name, task, "Task completed, waiting {:?}", pacing.delay())
                }
                CycleOutcome::NoOp { .. } => {
                    tracing::info!(agent = %name, task, "Nothing to do, backing off {:?}", pacing.delay())
                }
                CycleOutcome::Failed { error, .. } => tracing::error!(
                    agent = %name,
                    task,
                    error = ?error,
                    "Cycle failed: {}, retrying in {:?}",
                    error,
                    pacing.delay()
                ),
            }
            if !outcome.is_success() {
                self.set_phase(AgentPhase::Backoff);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pacing.delay()) => {}
            }
        }

        self.set_phase(AgentPhase::Stopped);
        tracing::info!(agent = %name, "Agent loop stopped");
    }
}
