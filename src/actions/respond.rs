//! 请求触发的回复：对外部传入的一条消息生成回复，并可作为回帖发出
//!
//! 参数：`{"text": "...", "parent_hash": "0x..."}`；parent_hash 缺省时只生成不发帖。
//! 生成结果写入工作记忆 `last_response`，供调用方读取。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::prompts::response_prompt;
use crate::actions::{Action, ActionContext};
use crate::core::AgentError;
use crate::memory::MemoryValue;

pub const LAST_RESPONSE_KEY: &str = "last_response";

pub struct RespondToMessage;

#[async_trait]
impl Action for RespondToMessage {
    fn name(&self) -> &str {
        "respond-to-message"
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, args: &Value) -> Result<bool, AgentError> {
        let message = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::HandlerFault {
                task: self.name().to_string(),
                message: "missing 'text' argument".to_string(),
            })?;

        let Some(response) = ctx.generate_text(&response_prompt(message)).await? else {
            return Ok(false);
        };

        if let Some(parent) = args.get("parent_hash").and_then(Value::as_str) {
            ctx.invoke("farcaster", "post-cast", json!([response, parent]))
                .await?;
        }
        ctx.runtime
            .memory
            .insert(LAST_RESPONSE_KEY, MemoryValue::Json(Value::String(response)));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::agent::{AgentDefinition, AgentRuntime};
    use crate::capability::{CapabilityExecutor, CapabilityRouter, MockConnection};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_respond_posts_reply_and_stores_text() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let def = AgentDefinition::from_value(
            &json!({
                "name": "MemeForge",
                "bio": ["memes"],
                "traits": [],
                "loop_delay": 1,
                "time_based_multipliers": {},
                "tasks": [{"name": "respond-to-message", "weight": 1}]
            }),
            &registry,
        )
        .unwrap();
        let farcaster = MockConnection::new("farcaster");
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::text_generator("openai"));
        router.register(farcaster.clone());
        let caps = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(5));
        let mut runtime = AgentRuntime::new();
        runtime.ensure_initialized(&def, &caps).unwrap();

        let mut ctx = ActionContext { definition: &def, runtime: &mut runtime, capabilities: &caps };
        let ok = RespondToMessage
            .execute(&mut ctx, &json!({"text": "make a meme", "parent_hash": "0xp"}))
            .await
            .unwrap();
        assert!(ok);
        let calls = farcaster.calls_to("post-cast");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1], json!("0xp"));
        assert!(matches!(
            ctx.runtime.memory.get(LAST_RESPONSE_KEY),
            Some(MemoryValue::Json(Value::String(s))) if s.contains("make a meme")
        ));

        let err = RespondToMessage.execute(&mut ctx, &json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::HandlerFault { .. }));
    }
}
