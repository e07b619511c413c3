//! 寻址消息解析：`AgentName!! 正文`
//!
//! 没有 `!!` 或名称为空时交给默认 Agent；正文去掉前缀后返回。

/// 返回 (Agent 名称, 清理后的正文)；名称为 None 表示使用默认 Agent
pub fn parse_addressed_message(text: &str) -> (Option<&str>, &str) {
    match text.split_once("!!") {
        Some((name, body)) => {
            let name = name.trim();
            ((!name.is_empty()).then_some(name), body.trim())
        }
        None => (None, text.trim()),
    }
}

/// 在已加载的 Agent 中解析目标：寻址名称存在则用之，否则回落到默认 Agent
pub fn resolve_target<'a>(
    text: &str,
    loaded: &'a [String],
    default_agent: Option<&'a str>,
) -> Option<&'a str> {
    let (name, _) = parse_addressed_message(text);
    name.and_then(|n| loaded.iter().find(|l| l.as_str() == n).map(String::as_str))
        .or(default_agent.filter(|d| loaded.iter().any(|l| l.as_str() == *d)))
}
