//! 动作注册表
//!
//! 所有任务 Handler 实现 Action trait（name / category / inputs / execute），由 ActionRegistry 按名注册与查找。
//! 注册表在启动时一次性构建，之后只读；重复注册在启动时报错，而不是在分发时。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{AgentDefinition, AgentRuntime};
use crate::capability::CapabilityExecutor;
use crate::core::task_scheduler::TaskCategory;
use crate::core::AgentError;

/// 周期补货的数据源：工作记忆中 key 为空时，调用 provider/operation 拉取
#[derive(Debug, Clone, PartialEq)]
pub struct InputSource {
    pub key: String,
    pub provider: String,
    pub operation: String,
    pub args: Value,
}

/// Handler 调用上下文：Agent 定义（只读）、运行时（独占可写）、能力执行器
pub struct ActionContext<'a> {
    pub definition: &'a AgentDefinition,
    pub runtime: &'a mut AgentRuntime,
    pub capabilities: &'a CapabilityExecutor,
}

impl ActionContext<'_> {
    pub async fn invoke(
        &self,
        provider: &str,
        operation: &str,
        args: Value,
    ) -> Result<Value, AgentError> {
        Ok(self.capabilities.invoke(provider, operation, args).await?)
    }

    /// 以 Agent 人设为 system prompt 生成文本；返回空文本视为无结果
    pub async fn generate_text(&mut self, prompt: &str) -> Result<Option<String>, AgentError> {
        let provider = self
            .runtime
            .text_provider
            .clone()
            .ok_or_else(|| AgentError::Setup("text provider not resolved".to_string()))?;
        let system_prompt = self.runtime.system_prompt(self.definition, self.capabilities).await;
        let result = self
            .invoke(&provider, "generate-text", serde_json::json!([prompt, system_prompt]))
            .await?;
        Ok(match result {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::Null => None,
            Value::String(_) => None,
            other => Some(other.to_string()),
        })
    }
}

/// 任务 Handler：返回 Ok(true) 表示执行成功，Ok(false) 表示本周期无事可做（非错误）
#[async_trait]
pub trait Action: Send + Sync {
    /// 任务名（Agent 定义中 tasks[].name）
    fn name(&self) -> &str;

    /// 定义中未显式给出类别时使用
    fn category(&self) -> TaskCategory {
        TaskCategory::Other
    }

    /// 本 Handler 依赖的补货数据源
    fn inputs(&self, _definition: &AgentDefinition) -> Vec<InputSource> {
        Vec::new()
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, args: &Value) -> Result<bool, AgentError>;
}

/// 动作注册表：按名称存储 Arc<dyn Action>
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置动作表构建的注册表
    pub fn with_builtin() -> Result<Self, AgentError> {
        let mut registry = Self::new();
        crate::actions::register_builtin(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, action: impl Action + 'static) -> Result<(), AgentError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(AgentError::DuplicateAction(name));
        }
        self.actions.insert(name, Arc::new(action));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Action>, AgentError> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTask(name.to_string()))
    }

    pub fn category_of(&self, name: &str) -> Option<TaskCategory> {
        self.actions.get(name).map(|a| a.category())
    }

    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// 该 Agent 全部任务所需的补货数据源（按 key 去重，保持任务顺序）
    pub fn inputs_for(&self, definition: &AgentDefinition) -> Vec<InputSource> {
        let mut seen = HashSet::new();
        definition
            .tasks
            .iter()
            .filter_map(|task| self.actions.get(&task.name))
            .flat_map(|action| action.inputs(definition))
            .filter(|source| seen.insert(source.key.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Action for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _ctx: &mut ActionContext<'_>, _args: &Value) -> Result<bool, AgentError> {
            Ok(false)
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ActionRegistry::new();
        registry.register(Noop).unwrap();
        assert!(matches!(registry.register(Noop), Err(AgentError::DuplicateAction(n)) if n == "noop"));
    }

    #[test]
    fn test_resolve_unknown_task() {
        let registry = ActionRegistry::new();
        assert!(matches!(registry.resolve("noop"), Err(AgentError::UnknownTask(_))));
        assert_eq!(registry.category_of("noop"), None);
    }

    #[test]
    fn test_builtin_table() {
        let registry = ActionRegistry::with_builtin().unwrap();
        for name in [
            "post-cast",
            "reply-to-cast",
            "like-cast",
            "post-tweet",
            "reply-to-tweet",
            "like-tweet",
            "respond-to-mentions",
            "respond-to-message",
        ] {
            assert!(registry.resolve(name).is_ok(), "missing {name}");
        }
        assert_eq!(registry.category_of("post-tweet"), Some(TaskCategory::Posting));
        assert_eq!(registry.category_of("like-tweet"), Some(TaskCategory::Engagement));
    }

    #[test]
    fn test_inputs_deduplicated_per_agent() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let definition = AgentDefinition::from_value(
            &json!({
                "name": "A",
                "bio": [],
                "traits": [],
                "loop_delay": 1,
                "time_based_multipliers": {},
                "config": [{"name": "farcaster", "timeline_read_count": 5}],
                "tasks": [
                    {"name": "reply-to-cast", "weight": 1},
                    {"name": "like-cast", "weight": 1},
                    {"name": "post-cast", "weight": 1}
                ]
            }),
            &registry,
        )
        .unwrap();
        let inputs = registry.inputs_for(&definition);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].key, "timeline_casts");
        assert_eq!(inputs[0].args, json!([5]));
    }
}
