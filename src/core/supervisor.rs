//! 多 Agent 监管者
//!
//! 持有「已加载」与「运行中」两个视图：每个已加载的名称对应一份定义与独占的运行时状态，
//! 运行中的名称额外持有一个执行上下文（tokio 任务 + CancellationToken + 阶段 watch）。
//! 注册表由一把互斥锁保护；stop 在持锁期间做有界等待，因此同名 Agent 不会出现两个执行上下文。
//! 单个 Agent 内的错误与 panic 只留在其任务内，不会传递到监管者或其他 Agent。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::actions::respond::LAST_RESPONSE_KEY;
use crate::actions::ActionRegistry;
use crate::agent::{
    dispatch_task, parse_addressed_message, record_label, resolve_target, AgentDefinition,
    AgentRunner, AgentRuntime, RunnerConfig,
};
use crate::capability::CapabilityExecutor;
use crate::core::error::LoadFailure;
use crate::core::task_scheduler::{HourClock, LocalClock};
use crate::core::{AgentError, AgentPhase, AgentStatus};
use crate::memory::MemoryValue;

/// 监管者参数
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub fallback_interval: Duration,
    /// stop 等待执行上下文退出的上限
    pub stop_timeout: Duration,
    pub startup_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            fallback_interval: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(5),
            startup_delay: Duration::ZERO,
        }
    }
}

/// load 的结果：成功加载的名称与被拒绝的记录
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

/// stop 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 执行上下文在超时内退出
    Stopped,
    /// 超时未退出：已从运行视图移除，任务在当前周期结束后自行退出
    Orphaned,
}

struct RunningAgent {
    run_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    phase_rx: watch::Receiver<AgentPhase>,
}

impl RunningAgent {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

struct AgentSlot {
    definition: Arc<AgentDefinition>,
    runtime: Arc<Mutex<AgentRuntime>>,
    running: Option<RunningAgent>,
    last_phase: AgentPhase,
}

impl AgentSlot {
    fn new(definition: AgentDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            runtime: Arc::new(Mutex::new(AgentRuntime::new())),
            running: None,
            last_phase: AgentPhase::Uninitialized,
        }
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(RunningAgent::is_alive)
    }

    /// 执行上下文已结束但未发布终态时（任务异常退出）报告为 Stopped
    fn phase(&self) -> AgentPhase {
        match &self.running {
            Some(running) => {
                let phase = *running.phase_rx.borrow();
                if running.is_alive() || phase.is_terminal() {
                    phase
                } else {
                    AgentPhase::Stopped
                }
            }
            None => self.last_phase,
        }
    }
}

#[derive(Default)]
struct AgentTable {
    slots: HashMap<String, AgentSlot>,
    /// 加载顺序
    order: Vec<String>,
}

pub struct AgentSupervisor {
    registry: Arc<ActionRegistry>,
    capabilities: CapabilityExecutor,
    config: SupervisorConfig,
    clock: Arc<dyn HourClock>,
    agents: Mutex<AgentTable>,
}

impl AgentSupervisor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        capabilities: CapabilityExecutor,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            capabilities,
            config,
            clock: Arc::new(LocalClock),
            agents: Mutex::new(AgentTable::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn HourClock>) -> Self {
        self.clock = clock;
        self
    }

    /// 校验并加载定义；无效记录逐条报告，不影响其他记录
    ///
    /// 同名且未运行的 Agent 被替换（运行时状态重新开始）；运行中的同名 Agent 拒绝替换。
    pub async fn load(&self, records: Vec<Value>) -> Result<LoadReport, AgentError> {
        let mut report = LoadReport::default();
        let mut valid = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match AgentDefinition::from_value(record, &self.registry) {
                Ok(definition) => valid.push(definition),
                Err(e) => {
                    let name = record_label(record, index);
                    tracing::warn!(agent = %name, "Rejected agent definition: {}", e);
                    report.failed.push(LoadFailure {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut table = self.agents.lock().await;
        for definition in valid {
            let name = definition.name.clone();
            match table.slots.get(&name) {
                Some(slot) if slot.is_running() => {
                    tracing::warn!(agent = %name, "Cannot reload a running agent");
                    report.failed.push(LoadFailure {
                        name,
                        reason: "agent is running; stop it before reloading".to_string(),
                    });
                    continue;
                }
                Some(_) => tracing::info!(agent = %name, "Replacing agent definition"),
                None => table.order.push(name.clone()),
            }
            table.slots.insert(name.clone(), AgentSlot::new(definition));
            tracing::info!(agent = %name, "Loaded agent");
            if !report.loaded.contains(&name) {
                report.loaded.push(name);
            }
        }

        if report.loaded.is_empty() {
            return Err(AgentError::NoValidAgents(report.failed));
        }
        Ok(report)
    }

    /// 启动执行上下文，返回本次运行 ID
    pub async fn start(&self, name: &str) -> Result<String, AgentError> {
        let mut table = self.agents.lock().await;
        let slot = table
            .slots
            .get_mut(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        if slot.is_running() {
            return Err(AgentError::AlreadyRunning(name.to_string()));
        }

        let runner = AgentRunner::new(
            Arc::clone(&slot.definition),
            Arc::clone(&slot.runtime),
            Arc::clone(&self.registry),
            self.capabilities.clone(),
            RunnerConfig {
                fallback_interval: self.config.fallback_interval,
                startup_delay: self.config.startup_delay,
            },
        )
        .with_clock(Arc::clone(&self.clock));

        let run_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let phase_rx = runner.subscribe();
        let span = tracing::info_span!("agent", name = %name, run_id = %run_id);
        let handle = tokio::spawn(runner.run(cancel.clone()).instrument(span));

        tracing::info!(agent = %name, run_id = %run_id, "Agent started");
        slot.running = Some(RunningAgent {
            run_id: run_id.clone(),
            cancel,
            handle,
            phase_rx,
        });
        Ok(run_id)
    }

    /// 发出停止信号并有界等待；超时则视为孤儿，同样从运行视图移除
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, AgentError> {
        let mut table = self.agents.lock().await;
        let slot = table
            .slots
            .get_mut(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        let running = slot
            .running
            .take()
            .ok_or_else(|| AgentError::NotRunning(name.to_string()))?;

        running.cancel.cancel();
        let outcome = self.await_exit(name, running.handle).await;
        slot.last_phase = match outcome {
            StopOutcome::Stopped => *running.phase_rx.borrow(),
            StopOutcome::Orphaned => {
                // 孤儿任务仍可能持有旧运行时，下一次启动使用新的
                slot.runtime = Arc::new(Mutex::new(AgentRuntime::new()));
                AgentPhase::Stopped
            }
        };
        Ok(outcome)
    }

    async fn await_exit(&self, name: &str, mut handle: JoinHandle<()>) -> StopOutcome {
        match tokio::time::timeout(self.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!(agent = %name, "Agent stopped");
                StopOutcome::Stopped
            }
            Ok(Err(e)) => {
                tracing::error!(agent = %name, "Agent task ended abnormally: {}", e);
                StopOutcome::Stopped
            }
            Err(_) => {
                tracing::warn!(
                    agent = %name,
                    "Agent did not stop within {:?}; orphaning its context",
                    self.config.stop_timeout
                );
                StopOutcome::Orphaned
            }
        }
    }

    /// 启动所有未运行的已加载 Agent
    pub async fn start_all(&self) -> Vec<(String, Result<String, AgentError>)> {
        let names = self.list_loaded().await;
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = self.start(&name).await;
            if let Err(e) = &result {
                if matches!(e, AgentError::AlreadyRunning(_)) {
                    continue;
                }
                tracing::error!(agent = %name, "Failed to start agent: {}", e);
            }
            results.push((name, result));
        }
        results
    }

    /// 先向所有运行中的 Agent 发出信号，再在同一个超时内并发等待
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        let mut table = self.agents.lock().await;
        let mut stopping = Vec::new();
        for name in &table.order {
            if let Some(running) = table.slots.get(name).and_then(|s| s.running.as_ref()) {
                running.cancel.cancel();
                stopping.push(name.clone());
            }
        }

        let waits = stopping.iter().filter_map(|name| {
            let running = table.slots.get_mut(name)?.running.take()?;
            Some(async move {
                let outcome = self.await_exit(name, running.handle).await;
                (name.clone(), outcome, *running.phase_rx.borrow())
            })
        });
        let finished: Vec<_> = futures_util::future::join_all(waits.collect::<Vec<_>>()).await;

        let mut results = Vec::with_capacity(finished.len());
        for (name, outcome, phase) in finished {
            if let Some(slot) = table.slots.get_mut(&name) {
                slot.last_phase = match outcome {
                    StopOutcome::Stopped => phase,
                    StopOutcome::Orphaned => {
                        slot.runtime = Arc::new(Mutex::new(AgentRuntime::new()));
                        AgentPhase::Stopped
                    }
                };
            }
            results.push((name, outcome));
        }
        tracing::info!("Stopped {} agents", results.len());
        results
    }

    /// 已加载的 Agent（按加载顺序）
    pub async fn list_loaded(&self) -> Vec<String> {
        self.agents.lock().await.order.clone()
    }

    /// 执行上下文仍然存活的 Agent
    pub async fn list_running(&self) -> Vec<String> {
        let table = self.agents.lock().await;
        table
            .order
            .iter()
            .filter(|name| table.slots.get(*name).is_some_and(AgentSlot::is_running))
            .cloned()
            .collect()
    }

    pub async fn status(&self, name: &str) -> Result<AgentStatus, AgentError> {
        let table = self.agents.lock().await;
        let slot = table
            .slots
            .get(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        Ok(AgentStatus {
            name: name.to_string(),
            phase: slot.phase(),
            running: slot.is_running(),
            run_id: slot
                .running
                .as_ref()
                .filter(|r| r.is_alive())
                .map(|r| r.run_id.clone()),
        })
    }

    /// 立即为某个 Agent 执行一个具名任务（与自主循环共用注册表与运行时状态）
    pub async fn execute_task(
        &self,
        agent: &str,
        task: &str,
        args: Value,
    ) -> Result<bool, AgentError> {
        self.execute_with(agent, task, args, |_| ())
            .await
            .map(|(done, ())| done)
    }

    /// 在同一次运行时锁内分发任务并读取结果；不持有注册表锁等待运行时
    async fn execute_with<T>(
        &self,
        agent: &str,
        task: &str,
        args: Value,
        read: impl FnOnce(&AgentRuntime) -> T,
    ) -> Result<(bool, T), AgentError> {
        let (definition, runtime) = {
            let table = self.agents.lock().await;
            let slot = table
                .slots
                .get(agent)
                .ok_or_else(|| AgentError::UnknownAgent(agent.to_string()))?;
            (Arc::clone(&slot.definition), Arc::clone(&slot.runtime))
        };
        // 先解析，未知任务不必等待运行时锁
        self.registry.resolve(task)?;

        let mut runtime = runtime.lock().await;
        runtime.ensure_initialized(&definition, &self.capabilities)?;
        tracing::info!(agent = %agent, task = %task, "Executing task on request");
        let done = dispatch_task(
            &self.registry,
            &definition,
            &mut runtime,
            &self.capabilities,
            task,
            &args,
        )
        .await?;
        Ok((done, read(&runtime)))
    }

    /// 回复一条 `Name!! text` 形式的消息；未寻址或名称未加载时交给 default_agent
    pub async fn respond_to_message(
        &self,
        text: &str,
        default_agent: Option<&str>,
        parent_hash: Option<&str>,
    ) -> Result<Option<String>, AgentError> {
        let loaded = self.list_loaded().await;
        let (addressed, body) = parse_addressed_message(text);
        let target = resolve_target(text, &loaded, default_agent)
            .ok_or_else(|| {
                AgentError::UnknownAgent(addressed.or(default_agent).unwrap_or_default().to_string())
            })?
            .to_string();

        let mut args = json!({ "text": body });
        if let Some(parent) = parent_hash {
            args["parent_hash"] = Value::String(parent.to_string());
        }
        let (done, response) = self
            .execute_with(&target, "respond-to-message", args, |runtime| {
                match runtime.memory.get(LAST_RESPONSE_KEY) {
                    Some(MemoryValue::Json(Value::String(response))) => Some(response.clone()),
                    _ => None,
                }
            })
            .await?;
        Ok(response.filter(|_| done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityRouter, MockConnection};
    use crate::core::task_scheduler::FixedClock;

    fn supervisor(stop_timeout: Duration) -> AgentSupervisor {
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::text_generator("openai"));
        router.register(MockConnection::new("farcaster"));
        let caps = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(5));
        AgentSupervisor::new(
            Arc::new(ActionRegistry::with_builtin().unwrap()),
            caps,
            SupervisorConfig {
                stop_timeout,
                ..Default::default()
            },
        )
        .with_clock(Arc::new(FixedClock(12)))
    }

    fn record(name: &str) -> Value {
        json!({
            "name": name,
            "bio": ["test agent"],
            "traits": ["calm"],
            "loop_delay": 10,
            "time_based_multipliers": {},
            "tasks": [{"name": "like-cast", "weight": 1}]
        })
    }

    #[tokio::test]
    async fn test_load_partial_success() {
        let sup = supervisor(Duration::from_secs(1));
        let mut broken = record("Broken");
        broken.as_object_mut().unwrap().remove("bio");

        let report = sup.load(vec![record("A"), broken]).await.unwrap();
        assert_eq!(report.loaded, vec!["A"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "Broken");
        assert!(report.failed[0].reason.contains("bio"));
    }

    #[tokio::test]
    async fn test_load_nothing_valid() {
        let sup = supervisor(Duration::from_secs(1));
        assert!(matches!(sup.load(vec![]).await, Err(AgentError::NoValidAgents(f)) if f.is_empty()));
        assert!(matches!(
            sup.load(vec![json!({"name": "X"})]).await,
            Err(AgentError::NoValidAgents(f)) if f.len() == 1
        ));
        assert!(sup.list_loaded().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A")]).await.unwrap();

        assert!(matches!(sup.start("Nobody").await, Err(AgentError::UnknownAgent(_))));
        assert!(matches!(sup.stop("A").await, Err(AgentError::NotRunning(_))));

        let run_id = sup.start("A").await.unwrap();
        assert!(matches!(sup.start("A").await, Err(AgentError::AlreadyRunning(_))));
        let status = sup.status("A").await.unwrap();
        assert!(status.running);
        assert_eq!(status.run_id.as_deref(), Some(run_id.as_str()));

        assert_eq!(sup.stop("A").await.unwrap(), StopOutcome::Stopped);
        assert!(sup.list_running().await.is_empty());
        assert_eq!(sup.list_loaded().await, vec!["A"]);
        let status = sup.status("A").await.unwrap();
        assert!(!status.running);
        assert_eq!(status.phase, AgentPhase::Stopped);

        // 停止后可以再次启动
        sup.start("A").await.unwrap();
        sup.stop("A").await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_running_agent_rejected() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A"), record("B")]).await.unwrap();
        sup.start("A").await.unwrap();

        let report = sup.load(vec![record("A"), record("B")]).await.unwrap();
        assert_eq!(report.loaded, vec!["B"]);
        assert_eq!(report.failed[0].name, "A");
        assert_eq!(sup.list_loaded().await, vec!["A", "B"]);
        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_start_all_and_stop_all() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A"), record("B")]).await.unwrap();

        let started = sup.start_all().await;
        assert_eq!(started.len(), 2);
        assert!(started.iter().all(|(_, r)| r.is_ok()));
        // 已运行的不重复启动
        assert!(sup.start_all().await.is_empty());
        assert_eq!(sup.list_running().await, vec!["A", "B"]);

        let stopped = sup.stop_all().await;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|(_, o)| *o == StopOutcome::Stopped));
        assert!(sup.list_running().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_task_unknown() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A")]).await.unwrap();
        assert!(matches!(
            sup.execute_task("A", "dance", Value::Null).await,
            Err(AgentError::UnknownTask(_))
        ));
        assert!(matches!(
            sup.execute_task("Z", "like-cast", Value::Null).await,
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_respond_to_addressed_message() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A"), record("B")]).await.unwrap();

        let reply = sup
            .respond_to_message("B!! tell me a joke", Some("A"), None)
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("tell me a joke"));
        assert!(matches!(
            sup.respond_to_message("hi", None, None).await,
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_dead_context_reports_stopped() {
        let sup = supervisor(Duration::from_secs(1));
        sup.load(vec![record("A")]).await.unwrap();

        let (phase_tx, phase_rx) = watch::channel(AgentPhase::Running);
        let handle = tokio::spawn(async {});
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        {
            let mut table = sup.agents.lock().await;
            table.slots.get_mut("A").unwrap().running = Some(RunningAgent {
                run_id: "r1".into(),
                cancel: CancellationToken::new(),
                handle,
                phase_rx,
            });
        }

        let status = sup.status("A").await.unwrap();
        assert!(!status.running);
        assert_eq!(status.phase, AgentPhase::Stopped);
        assert!(status.run_id.is_none());
        assert!(sup.list_running().await.is_empty());
        drop(phase_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_responses_are_not_mixed_up() {
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::text_generator("openai").with_delay(Duration::from_millis(50)));
        let sup = AgentSupervisor::new(
            Arc::new(ActionRegistry::with_builtin().unwrap()),
            CapabilityExecutor::new(Arc::new(router), Duration::from_secs(5)),
            SupervisorConfig::default(),
        );
        sup.load(vec![record("A")]).await.unwrap();

        let (first, second) = tokio::join!(
            sup.respond_to_message("A!! first question", None, None),
            sup.respond_to_message("A!! second question", None, None),
        );
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert!(first.contains("first question") && !first.contains("second"));
        assert!(second.contains("second question") && !second.contains("first"));
    }
}
