//! Agent 定义来源：`{"agents": [ ... ]}` 形式的 JSON 文件
//!
//! 只负责读取原始记录；校验在 Supervisor::load 中逐条进行，以便部分成功。

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

pub fn load_definitions_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<Value>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read agent definitions from {}", path.display()))?;
    parse_definitions(&raw).with_context(|| format!("Invalid agent definitions in {}", path.display()))
}

pub fn parse_definitions(raw: &str) -> anyhow::Result<Vec<Value>> {
    let mut doc: Value = serde_json::from_str(raw)?;
    match doc.get_mut("agents").map(Value::take) {
        Some(Value::Array(agents)) => Ok(agents),
        Some(_) => anyhow::bail!("'agents' must be an array"),
        None => anyhow::bail!("file does not contain an 'agents' array"),
    }
}
