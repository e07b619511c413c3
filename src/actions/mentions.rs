//! 回复 Farcaster mention：单次轮询，已处理的 mention 记入去重集合

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::prompts::reply_prompt;
use crate::actions::social::field_str;
use crate::actions::{Action, ActionContext};
use crate::core::task_scheduler::TaskCategory;
use crate::core::AgentError;

pub const PROCESSED_MENTIONS_KEY: &str = "processed_mentions";

pub struct RespondToMentions;

#[async_trait]
impl Action for RespondToMentions {
    fn name(&self) -> &str {
        "respond-to-mentions"
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Engagement
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, _args: &Value) -> Result<bool, AgentError> {
        let Some(fid) = ctx.runtime.identity.farcaster_fid else {
            tracing::error!(agent = %ctx.definition.name, "No Farcaster FID configured, cannot poll mentions");
            return Ok(false);
        };

        let mentions = ctx.invoke("farcaster", "get-mentions", json!([fid])).await?;
        let Value::Array(mentions) = mentions else {
            tracing::debug!(agent = %ctx.definition.name, "No new mentions");
            return Ok(false);
        };

        let mut replied = 0usize;
        for mention in mentions {
            let Some(hash) = field_str(&mention, "hash") else {
                continue;
            };
            if ctx.runtime.memory.set_contains(PROCESSED_MENTIONS_KEY, &hash) {
                continue;
            }
            let text = mention.get("text").and_then(Value::as_str).unwrap_or_default();
            tracing::info!(agent = %ctx.definition.name, mention = %hash, "Received mention: {}", text);

            let Some(reply) = ctx.generate_text(&reply_prompt(text, 320)).await? else {
                continue;
            };
            let author = field_str(&mention, "author_fid").unwrap_or_default();
            ctx.invoke("farcaster", "reply-to-cast", json!([author, hash, reply]))
                .await?;
            ctx.runtime.memory.set_insert(PROCESSED_MENTIONS_KEY, hash);
            replied += 1;
        }

        Ok(replied > 0)
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

    fn setup(farcaster: MockConnection, fid: Option<u64>) -> (AgentDefinition, AgentRuntime, CapabilityExecutor) {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut connection = json!({"name": "farcaster"});
        if let Some(fid) = fid {
            connection["fid"] = json!(fid);
        }
        let definition = AgentDefinition::from_value(
            &json!({
                "name": "A",
                "bio": [],
                "traits": [],
                "loop_delay": 1,
                "time_based_multipliers": {},
                "config": [connection],
                "tasks": [{"name": "respond-to-mentions", "weight": 1}]
            }),
            &registry,
        )
        .unwrap();
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::text_generator("openai"));
        router.register(farcaster);
        let caps = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(5));
        let mut runtime = AgentRuntime::new();
        runtime.ensure_initialized(&definition, &caps).unwrap();
        (definition, runtime, caps)
    }

    #[tokio::test]
    async fn test_mentions_deduplicated_across_polls() {
        let farcaster = MockConnection::new("farcaster").respond(
            "get-mentions",
            json!([
                {"hash": "0x1", "author_fid": 5, "text": "hey @agent"},
                {"hash": "0x2", "author_fid": 6, "text": "sup"}
            ]),
        );
        let (def, mut runtime, caps) = setup(farcaster.clone(), Some(42));
        let mut ctx = ActionContext { definition: &def, runtime: &mut runtime, capabilities: &caps };

        assert!(RespondToMentions.execute(&mut ctx, &Value::Null).await.unwrap());
        assert!(!RespondToMentions.execute(&mut ctx, &Value::Null).await.unwrap());
        assert_eq!(farcaster.calls_to("reply-to-cast").len(), 2);
        assert_eq!(farcaster.calls_to("get-mentions")[0], json!([42]));
        assert!(ctx.runtime.memory.set_contains(PROCESSED_MENTIONS_KEY, "0x2"));
    }

    #[tokio::test]
    async fn test_mentions_require_fid() {
        std::env::remove_var("FARCASTER_FID");
        let farcaster = MockConnection::new("farcaster");
        let (def, mut runtime, caps) = setup(farcaster.clone(), None);
        let mut ctx = ActionContext { definition: &def, runtime: &mut runtime, capabilities: &caps };
        assert!(!RespondToMentions.execute(&mut ctx, &Value::Null).await.unwrap());
        assert!(farcaster.calls().is_empty());
    }
}
