//! Mock 连接（用于测试与本地运行，无需任何外部 API）
//!
//! 每个 operation 可配置固定返回值或一次性返回序列；记录全部调用。
//! 文本生成连接在未配置时回显 prompt，便于本地跑通完整循环。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::Connection;

#[derive(Default)]
struct MockState {
    defaults: HashMap<String, Result<Value, String>>,
    scripted: HashMap<String, VecDeque<Result<Value, String>>>,
    calls: Vec<(String, Value)>,
}

/// Mock 连接：克隆共享同一份状态，测试可在注册后继续观察调用记录
#[derive(Clone)]
pub struct MockConnection {
    name: String,
    generates_text: bool,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generates_text: false,
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// 支持 generate-text 的连接
    pub fn text_generator(name: impl Into<String>) -> Self {
        Self {
            generates_text: true,
            ..Self::new(name)
        }
    }

    /// 每次调用前等待（模拟慢调用 / 超时）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 设置 operation 的默认返回值
    pub fn respond(self, operation: &str, value: Value) -> Self {
        self.lock().defaults.insert(operation.to_string(), Ok(value));
        self
    }

    /// 设置 operation 总是失败
    pub fn fail(self, operation: &str, message: &str) -> Self {
        self.lock()
            .defaults
            .insert(operation.to_string(), Err(message.to_string()));
        self
    }

    /// 追加一次性返回值，用完后回落到默认值
    pub fn respond_once(self, operation: &str, result: Result<Value, String>) -> Self {
        self.lock()
            .scripted
            .entry(operation.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// 全部调用记录：(operation, args)
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // 测试线程 panic 导致的中毒不影响记录读取
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn generates_text(&self) -> bool {
        self.generates_text
    }

    async fn perform(&self, operation: &str, args: Value) -> Result<Value, String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.calls.push((operation.to_string(), args.clone()));

        if let Some(result) = state
            .scripted
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }
        if let Some(result) = state.defaults.get(operation) {
            return result.clone();
        }

        if self.generates_text && operation == "generate-text" {
            let prompt = args.get(0).and_then(Value::as_str).unwrap_or("(no prompt)");
            return Ok(Value::String(format!("Echo from Mock: {prompt}")));
        }
        Ok(Value::Null)
    }
}
