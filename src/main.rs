//! Hive - 多 Agent 社交调度引擎
//!
//! 入口：初始化日志与配置，加载 Agent 定义，启动所有 Agent，直到 Ctrl+C / SIGTERM 后全部停止。
//! 本地运行使用 Mock 连接，不访问任何外部 API。
//!
//! 用法：`hive [agents.json]`，未指定时使用配置中的 app.agents_file。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::actions::ActionRegistry;
use hive::agent::load_definitions_file;
use hive::capability::{CapabilityExecutor, CapabilityRouter, MockConnection};
use hive::config::load_config_or_default;
use hive::core::{
    AgentSupervisor, ShutdownCoordinator, ShutdownManager, ShutdownReason, SupervisorCleanup,
};
use serde_json::json;

/// 本地演示用连接：回显式文本生成 + 带少量样例数据的社交平台
fn local_router() -> CapabilityRouter {
    let mut router = CapabilityRouter::new();
    router.register(MockConnection::text_generator("openai"));
    router.register(
        MockConnection::new("farcaster")
            .respond(
                "read-timeline",
                json!([
                    {"hash": "0xa1", "author_fid": 1001, "text": "gm frens"},
                    {"hash": "0xa2", "author_fid": 1002, "text": "shipping rust today"}
                ]),
            )
            .respond("get-mentions", json!([])),
    );
    router.register(MockConnection::new("twitter").respond(
        "read-timeline",
        json!([{"id": "1", "author_username": "rustlang", "text": "Rust 2024 edition is out"}]),
    ));
    router
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config = load_config_or_default(None);
    let agents_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.app.agents_file.clone());

    let registry = Arc::new(ActionRegistry::with_builtin().context("Failed to build action registry")?);
    tracing::info!(actions = ?registry.action_names(), "Action registry ready");

    let router = local_router();
    tracing::info!(connections = ?router.connection_names(), "Capability router ready");
    let capabilities = CapabilityExecutor::new(Arc::new(router), config.scheduler.provider_timeout());
    let supervisor_config = config.scheduler.to_supervisor_config();
    let stop_timeout = supervisor_config.stop_timeout;
    let supervisor = Arc::new(AgentSupervisor::new(registry, capabilities, supervisor_config));

    let records = load_definitions_file(&agents_file)?;
    let report = supervisor
        .load(records)
        .await
        .with_context(|| format!("No agent in {} could be loaded", agents_file.display()))?;
    for failure in &report.failed {
        tracing::warn!(agent = %failure.name, "Skipped: {}", failure.reason);
    }

    let shutdown = Arc::new(ShutdownManager::new());
    let mut reasons = shutdown.subscribe();
    shutdown.install_signal_handlers();
    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&shutdown))
        .with_timeout(stop_timeout + std::time::Duration::from_secs(1));
    coordinator.register(SupervisorCleanup::new(Arc::clone(&supervisor)));

    let mut running = 0;
    for (name, result) in supervisor.start_all().await {
        if let Ok(run_id) = result {
            tracing::info!(agent = %name, run_id = %run_id, "Running");
            running += 1;
        }
    }
    if running == 0 {
        shutdown.shutdown(ShutdownReason::FatalError("no agent could be started".to_string()));
    }

    shutdown.wait_for_shutdown().await;
    if let Ok(reason) = reasons.try_recv() {
        tracing::info!(reason = ?reason, "Shutting down");
    }
    coordinator.run_cleanup().await;
    Ok(())
}
