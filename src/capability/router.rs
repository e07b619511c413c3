//! 连接路由：按 provider 名称分发到已注册的 Connection

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::{CapabilityProvider, Connection};
use crate::core::ProviderError;

/// 连接表：按名称存储 Arc<dyn Connection>，保留注册顺序用于选择默认文本 provider
#[derive(Default)]
pub struct CapabilityRouter {
    connections: HashMap<String, Arc<dyn Connection>>,
    order: Vec<String>,
}

impl CapabilityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: impl Connection + 'static) {
        let name = connection.name().to_string();
        if self.connections.insert(name.clone(), Arc::new(connection)).is_none() {
            self.order.push(name);
        }
    }

    pub fn connection_names(&self) -> Vec<String> {
        self.order.clone()
    }
}

#[async_trait]
impl CapabilityProvider for CapabilityRouter {
    async fn invoke(
        &self,
        provider: &str,
        operation: &str,
        args: Value,
    ) -> Result<Value, ProviderError> {
        let connection = self
            .connections
            .get(provider)
            .ok_or_else(|| ProviderError::Unavailable(provider.to_string()))?;
        connection
            .perform(operation, args)
            .await
            .map_err(|message| ProviderError::Failed {
                provider: provider.to_string(),
                operation: operation.to_string(),
                message,
            })
    }

    fn text_providers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.connections
                    .get(name.as_str())
                    .is_some_and(|c| c.generates_text())
            })
            .cloned()
            .collect()
    }
}
