//! 工作记忆：Agent 每周期的可变缓存
//!
//! 按键存储：待处理队列（时间线、回复）、去重集合（已处理的 mention）、时间戳（上次发帖）、任意 JSON。
//! 只由所属 Agent 的循环及其 Handler 写入。

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// 工作记忆中的单个值
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryValue {
    Queue(VecDeque<Value>),
    Set(HashSet<String>),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl MemoryValue {
    /// 由外部读取结果构造：数组 -> 队列，其它 -> Json
    pub fn from_fetched(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Queue(items.into()),
            other => Self::Json(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Queue(q) => q.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Timestamp(_) => false,
            Self::Json(v) => v.is_null(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    entries: HashMap<String, MemoryValue>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MemoryValue> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MemoryValue) {
        self.entries.insert(key.into(), value);
    }

    /// 键不存在或值为空（补货判断）
    pub fn is_empty_or_absent(&self, key: &str) -> bool {
        self.entries.get(key).map_or(true, MemoryValue::is_empty)
    }

    pub fn queue_len(&self, key: &str) -> usize {
        match self.entries.get(key) {
            Some(MemoryValue::Queue(q)) => q.len(),
            _ => 0,
        }
    }

    /// 取出队首；键不是队列时返回 None
    pub fn pop_front(&mut self, key: &str) -> Option<Value> {
        match self.entries.get_mut(key) {
            Some(MemoryValue::Queue(q)) => q.pop_front(),
            _ => None,
        }
    }

    /// 追加到队尾；键不存在或不是队列时新建队列
    pub fn extend_queue(&mut self, key: &str, items: impl IntoIterator<Item = Value>) {
        match self.entries.get_mut(key) {
            Some(MemoryValue::Queue(q)) => q.extend(items),
            _ => {
                self.entries
                    .insert(key.to_string(), MemoryValue::Queue(items.into_iter().collect()));
            }
        }
    }

    pub fn set_contains(&self, key: &str, member: &str) -> bool {
        matches!(self.entries.get(key), Some(MemoryValue::Set(s)) if s.contains(member))
    }

    /// 加入去重集合，返回是否为新成员
    pub fn set_insert(&mut self, key: &str, member: impl Into<String>) -> bool {
        match self.entries.get_mut(key) {
            Some(MemoryValue::Set(s)) => s.insert(member.into()),
            _ => {
                let mut s = HashSet::new();
                s.insert(member.into());
                self.entries.insert(key.to_string(), MemoryValue::Set(s));
                true
            }
        }
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.entries.get(key) {
            Some(MemoryValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn set_timestamp(&mut self, key: &str, at: DateTime<Utc>) {
        self.entries.insert(key.to_string(), MemoryValue::Timestamp(at));
    }
}
