//! Agent 运行时状态：工作记忆、默认文本 provider、平台身份、一次性初始化标记
//!
//! 由该 Agent 的执行上下文独占写入；监管者只持有句柄，不写入。

use crate::agent::prompt::build_system_prompt;
use crate::agent::AgentDefinition;
use crate::capability::CapabilityExecutor;
use crate::core::AgentError;
use crate::memory::WorkingMemory;

/// Agent 在各平台上的自身身份（用于识别自己的帖子）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformIdentity {
    pub farcaster_fid: Option<u64>,
    pub twitter_username: Option<String>,
}

impl PlatformIdentity {
    /// 连接配置优先，其次环境变量 FARCASTER_FID / TWITTER_USERNAME
    pub fn resolve(definition: &AgentDefinition) -> Self {
        let farcaster = definition.connection("farcaster");
        let twitter = definition.connection("twitter");

        let fid_raw = farcaster
            .and_then(|c| c.settings.get("fid"))
            .map(|v| v.to_string().trim_matches('"').to_string())
            .or_else(|| std::env::var("FARCASTER_FID").ok());
        let farcaster_fid = match fid_raw {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(fid) => Some(fid),
                Err(_) => {
                    tracing::error!(agent = %definition.name, "Invalid Farcaster FID '{}', must be an integer", raw);
                    None
                }
            },
            None => {
                if farcaster.is_some() {
                    tracing::warn!(agent = %definition.name, "Farcaster FID not configured, own-cast detection disabled");
                }
                None
            }
        };

        let twitter_username = twitter
            .and_then(|c| c.str("username").map(str::to_string))
            .or_else(|| std::env::var("TWITTER_USERNAME").ok())
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty());
        if twitter_username.is_none() && twitter.is_some() {
            tracing::warn!(agent = %definition.name, "Twitter username not configured, own-tweet detection disabled");
        }

        Self {
            farcaster_fid,
            twitter_username,
        }
    }
}

#[derive(Debug, Default)]
pub struct AgentRuntime {
    pub memory: WorkingMemory,
    /// 一次性初始化时确定的默认文本生成 provider
    pub text_provider: Option<String>,
    pub identity: PlatformIdentity,
    system_prompt: Option<String>,
    initialized: bool,
}

impl AgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 一次性初始化：选择默认文本 provider、解析平台身份；成功后再次调用为 no-op
    pub fn ensure_initialized(
        &mut self,
        definition: &AgentDefinition,
        capabilities: &CapabilityExecutor,
    ) -> Result<(), AgentError> {
        if self.initialized {
            return Ok(());
        }
        let provider = capabilities
            .text_providers()
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Setup("no configured text generation provider".to_string()))?;

        tracing::info!(agent = %definition.name, provider = %provider, "Agent initialized");
        self.text_provider = Some(provider);
        self.identity = PlatformIdentity::resolve(definition);
        self.initialized = true;
        Ok(())
    }

    /// 人设 system prompt，首次使用时构造并缓存
    pub async fn system_prompt(
        &mut self,
        definition: &AgentDefinition,
        capabilities: &CapabilityExecutor,
    ) -> String {
        if let Some(prompt) = &self.system_prompt {
            return prompt.clone();
        }
        let prompt = build_system_prompt(&definition.persona, capabilities).await;
        self.system_prompt = Some(prompt.clone());
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::capability::{CapabilityRouter, MockConnection};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn definition() -> AgentDefinition {
        let registry = ActionRegistry::with_builtin().unwrap();
        AgentDefinition::from_value(
            &json!({
                "name": "A",
                "bio": ["bio"],
                "traits": [],
                "loop_delay": 1,
                "time_based_multipliers": {},
                "config": [{"name": "farcaster", "fid": 1234}],
                "tasks": [{"name": "post-cast", "weight": 1}]
            }),
            &registry,
        )
        .unwrap()
    }

    #[test]
    fn test_initialization_is_idempotent() {
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::text_generator("openai"));
        let caps = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(1));
        let def = definition();

        let mut runtime = AgentRuntime::new();
        runtime.ensure_initialized(&def, &caps).unwrap();
        assert!(runtime.is_initialized());
        assert_eq!(runtime.text_provider.as_deref(), Some("openai"));
        assert_eq!(runtime.identity.farcaster_fid, Some(1234));

        runtime.text_provider = Some("changed".into());
        runtime.ensure_initialized(&def, &caps).unwrap();
        assert_eq!(runtime.text_provider.as_deref(), Some("changed"));
    }

    #[test]
    fn test_initialization_requires_text_provider() {
        let caps = CapabilityExecutor::new(Arc::new(CapabilityRouter::new()), Duration::from_secs(1));
        let mut runtime = AgentRuntime::new();
        assert!(matches!(
            runtime.ensure_initialized(&definition(), &caps),
            Err(AgentError::Setup(_))
        ));
        assert!(!runtime.is_initialized());
    }

    #[tokio::test]
    async fn test_system_prompt_is_cached() {
        let caps = CapabilityExecutor::new(Arc::new(CapabilityRouter::new()), Duration::from_secs(1));
        let def = definition();
        let mut runtime = AgentRuntime::new();
        let first = runtime.system_prompt(&def, &caps).await;
        assert_eq!(first, "bio");
        assert_eq!(runtime.system_prompt(&def, &caps).await, first);
    }
}
