//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SCHEDULER__FALLBACK_INTERVAL_SECS=120`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::SupervisorConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub scheduler: SchedulerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// Agent 定义文件，命令行参数可覆盖
    #[serde(default = "default_agents_file")]
    pub agents_file: PathBuf,
    /// 未寻址消息交给的 Agent
    pub default_agent: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            agents_file: default_agents_file(),
            default_agent: None,
        }
    }
}

fn default_agents_file() -> PathBuf {
    PathBuf::from("agents/agents.json")
}

/// [scheduler] 段：循环节奏与超时（单位：秒）
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// 无事可做 / 失败后的退避间隔；实际取 max(该值, loop_delay + 1s)
    #[serde(default = "default_fallback_interval_secs")]
    pub fallback_interval_secs: u64,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    /// 单次能力调用超时
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

fn default_fallback_interval_secs() -> u64 {
    60
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_provider_timeout_secs() -> u64 {
    30
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            fallback_interval_secs: default_fallback_interval_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl SchedulerSection {
    pub fn to_supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            fallback_interval: Duration::from_secs(self.fallback_interval_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            startup_delay: Duration::from_secs(self.startup_delay_secs),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 加载失败时记录警告并使用默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.app.agents_file, PathBuf::from("agents/agents.json"));
        let sup = config.scheduler.to_supervisor_config();
        assert_eq!(sup.fallback_interval, Duration::from_secs(60));
        assert_eq!(sup.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.scheduler.provider_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[scheduler]\nfallback_interval_secs = 120\n\n[app]\ndefault_agent = \"MemeForge\"").unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.scheduler.fallback_interval_secs, 120);
        assert_eq!(config.scheduler.stop_timeout_secs, 5);
        assert_eq!(config.app.default_agent.as_deref(), Some("MemeForge"));
    }
}
