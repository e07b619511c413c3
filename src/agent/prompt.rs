//! 人设 system prompt 构造
//!
//! bio + 特质 + 风格示例 + 参考账号最新帖子；参考账号拉取失败只记日志，不影响其余部分。

use serde_json::{json, Value};

use crate::agent::Persona;
use crate::capability::CapabilityExecutor;

const EXAMPLE_ACCOUNT_PROVIDER: &str = "twitter";
const EXAMPLE_ACCOUNT_OPERATION: &str = "get-latest-tweets";

pub async fn build_system_prompt(persona: &Persona, capabilities: &CapabilityExecutor) -> String {
    let mut parts: Vec<String> = persona.bio.clone();

    if !persona.traits.is_empty() {
        parts.push("\nYour key traits are:".to_string());
        parts.extend(persona.traits.iter().map(|t| format!("- {t}")));
    }

    let mut examples: Vec<String> = persona.examples.iter().map(|e| format!("- {e}")).collect();
    for account in &persona.example_accounts {
        tracing::info!(account = %account, "Fetching latest posts for style reference");
        match capabilities
            .invoke(EXAMPLE_ACCOUNT_PROVIDER, EXAMPLE_ACCOUNT_OPERATION, json!([account]))
            .await
        {
            Ok(Value::Array(posts)) => examples.extend(
                posts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .map(|text| format!("- {text}")),
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(account = %account, "Style reference fetch failed: {}", e),
        }
    }

    if !examples.is_empty() {
        parts.push(
            "\nHere are some examples of your style (do not repeat any of them):".to_string(),
        );
        parts.extend(examples);
    }

    parts.join("\n")
}
