//! 能力执行器
//!
//! 持有 CapabilityProvider 与统一超时，invoke(provider, operation, args) 在超时内调用，
//! 超时转为 ProviderError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::capability::CapabilityProvider;
use crate::core::ProviderError;

/// 能力执行器：对每次调用施加超时；可廉价克隆，供多个 Agent 共享
#[derive(Clone)]
pub struct CapabilityExecutor {
    provider: Arc<dyn CapabilityProvider>,
    timeout: Duration,
}

impl CapabilityExecutor {
    pub fn new(provider: Arc<dyn CapabilityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn invoke(
        &self,
        provider: &str,
        operation: &str,
        args: Value,
    ) -> Result<Value, ProviderError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.provider.invoke(provider, operation, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "capability_audit",
            "provider": provider,
            "operation": operation,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "capability");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.to_string(),
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    pub fn text_providers(&self) -> Vec<String> {
        self.provider.text_providers()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityRouter, MockConnection};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let mut router = CapabilityRouter::new();
        router.register(
            MockConnection::new("farcaster")
                .with_delay(Duration::from_secs(10))
                .respond("get-mentions", json!([])),
        );
        let executor = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(1));
        let err = executor
            .invoke("farcaster", "get-mentions", json!([42]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { timeout_ms: 1000, .. }));
    }

    #[tokio::test]
    async fn test_failure_is_mapped() {
        let mut router = CapabilityRouter::new();
        router.register(MockConnection::new("twitter").fail("post-tweet", "401"));
        let executor = CapabilityExecutor::new(Arc::new(router), Duration::from_secs(5));
        let err = executor.invoke("twitter", "post-tweet", json!(["hi"])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Failed { ref message, .. } if message == "401"));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!(["x".repeat(500)]);
        assert!(args_preview(&long).ends_with("..."));
        assert_eq!(args_preview(&json!([1])), "[1]");
    }
}
