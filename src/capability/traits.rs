//! 能力提供者抽象
//!
//! 调度核心只通过 `invoke(provider, operation, args)` 使用外部能力（发帖、读时间线、生成文本等），
//! provider / operation 均为不透明字符串，由实现方解析。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ProviderError;

/// 能力提供者 trait：可被多个 Agent 并发调用
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// 调用 `provider` 上的 `operation`，args 为 JSON 数组形式的位置参数
    async fn invoke(&self, provider: &str, operation: &str, args: Value)
        -> Result<Value, ProviderError>;

    /// 可用于文本生成的 provider 名称（按优先级）；一次性初始化时取第一个
    fn text_providers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 单个外部连接（如 farcaster / twitter / openai），由 CapabilityRouter 按名分发
#[async_trait]
pub trait Connection: Send + Sync {
    fn name(&self) -> &str;

    /// 是否支持 generate-text
    fn generates_text(&self) -> bool {
        false
    }

    async fn perform(&self, operation: &str, args: Value) -> Result<Value, String>;
}
