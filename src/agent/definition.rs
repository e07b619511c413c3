//! Agent 定义：加载后不可变
//!
//! 从 JSON 记录解析：先检查必填字段（缺失即 MissingField，不做默认），再反序列化，
//! 最后做语义校验（任务名唯一、权重非负且不全为 0、窗口合法、任务已注册并确定类别）。

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::actions::ActionRegistry;
use crate::core::task_scheduler::{HourWindow, MultiplierRule, TaskCategory, WeightedTask};
use crate::core::ValidationError;

/// 必填字段（按报告顺序）
pub const REQUIRED_FIELDS: [&str; 6] = [
    "name",
    "bio",
    "traits",
    "loop_delay",
    "tasks",
    "time_based_multipliers",
];

/// 人设字段：调度器不读取，仅供文本生成类 Handler 构造 system prompt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Persona {
    pub bio: Vec<String>,
    pub traits: Vec<String>,
    pub examples: Vec<String>,
    /// 风格参考账号，初始化 system prompt 时拉取其最新帖子
    pub example_accounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub name: String,
    pub weight: f64,
    pub category: TaskCategory,
    /// 传给 Handler 的静态参数
    pub args: Value,
}

/// 时段系数表：夜间抑制 Posting，白天加成 Engagement
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeMultipliers {
    #[serde(default = "default_night_multiplier", alias = "tweet_night_multiplier")]
    pub night_multiplier: f64,
    #[serde(default = "default_day_multiplier", alias = "engagement_day_multiplier")]
    pub day_multiplier: f64,
    #[serde(default = "default_night_hours")]
    pub night_hours: HourWindow,
    #[serde(default = "default_day_hours")]
    pub day_hours: HourWindow,
}

fn default_night_multiplier() -> f64 {
    0.4
}

fn default_day_multiplier() -> f64 {
    1.5
}

fn default_night_hours() -> HourWindow {
    HourWindow::new(1, 5)
}

fn default_day_hours() -> HourWindow {
    HourWindow::new(8, 20)
}

impl Default for TimeMultipliers {
    fn default() -> Self {
        Self {
            night_multiplier: default_night_multiplier(),
            day_multiplier: default_day_multiplier(),
            night_hours: default_night_hours(),
            day_hours: default_day_hours(),
        }
    }
}

impl TimeMultipliers {
    pub fn rules(&self) -> Vec<MultiplierRule> {
        vec![
            MultiplierRule {
                category: TaskCategory::Posting,
                window: self.night_hours,
                coefficient: self.night_multiplier,
            },
            MultiplierRule {
                category: TaskCategory::Engagement,
                window: self.day_hours,
                coefficient: self.day_multiplier,
            },
        ]
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("night_multiplier", self.night_multiplier),
            ("day_multiplier", self.day_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidMultiplier {
                    name: name.to_string(),
                    value,
                });
            }
        }
        for window in [self.night_hours, self.day_hours] {
            if !window.is_valid() {
                return Err(ValidationError::InvalidHourWindow {
                    start: window.start,
                    end: window.end,
                });
            }
        }
        Ok(())
    }
}

/// 单个外部连接的设置（如 `{"name": "farcaster", "cast_interval": 900}`）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ConnectionConfig {
    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.settings.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
struct RawTask {
    name: String,
    weight: f64,
    #[serde(default)]
    category: Option<TaskCategory>,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct RawDefinition {
    name: String,
    bio: Vec<String>,
    traits: Vec<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    example_accounts: Vec<String>,
    loop_delay: u64,
    tasks: Vec<RawTask>,
    #[serde(default = "default_use_time_based_weights")]
    use_time_based_weights: bool,
    time_based_multipliers: TimeMultipliers,
    #[serde(default)]
    config: Vec<ConnectionConfig>,
}

fn default_use_time_based_weights() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub persona: Persona,
    pub tasks: Vec<TaskDefinition>,
    /// 两个周期之间的间隔
    pub loop_delay: Duration,
    pub use_time_based_weights: bool,
    pub multipliers: TimeMultipliers,
    pub connections: Vec<ConnectionConfig>,
}

impl AgentDefinition {
    /// 解析并校验一条定义；任务类别未显式给出时取 Handler 声明的类别
    pub fn from_value(value: &Value, registry: &ActionRegistry) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| object.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingField(missing.join(", ")));
        }

        let raw: RawDefinition = serde_json::from_value(value.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if raw.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        if raw.tasks.is_empty() {
            return Err(ValidationError::NoTasks);
        }
        raw.time_based_multipliers.validate()?;

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(raw.tasks.len());
        for task in raw.tasks {
            if !seen.insert(task.name.clone()) {
                return Err(ValidationError::DuplicateTask(task.name));
            }
            if !task.weight.is_finite() || task.weight < 0.0 {
                return Err(ValidationError::InvalidWeight {
                    task: task.name,
                    weight: task.weight,
                });
            }
            let registered = registry
                .category_of(&task.name)
                .ok_or_else(|| ValidationError::UnregisteredTask(task.name.clone()))?;
            tasks.push(TaskDefinition {
                category: task.category.unwrap_or(registered),
                name: task.name,
                weight: task.weight,
                args: task.args,
            });
        }
        if tasks.iter().all(|t| t.weight == 0.0) {
            return Err(ValidationError::AllWeightsZero);
        }

        Ok(Self {
            name: raw.name,
            persona: Persona {
                bio: raw.bio,
                traits: raw.traits,
                examples: raw.examples,
                example_accounts: raw.example_accounts,
            },
            tasks,
            loop_delay: Duration::from_secs(raw.loop_delay),
            use_time_based_weights: raw.use_time_based_weights,
            multipliers: raw.time_based_multipliers,
            connections: raw.config,
        })
    }

    pub fn weighted_tasks(&self) -> Vec<WeightedTask> {
        self.tasks
            .iter()
            .map(|t| WeightedTask {
                name: t.name.clone(),
                weight: t.weight,
                category: t.category,
            })
            .collect()
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }
}

/// 从原始记录中尽量取出名称，用于失败报告
pub fn record_label(value: &Value, index: usize) -> String {
    value
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "MemeForge",
            "bio": ["You are MemeForge."],
            "traits": ["witty"],
            "examples": ["gm frens"],
            "loop_delay": 30,
            "use_time_based_weights": true,
            "time_based_multipliers": {
                "tweet_night_multiplier": 0.4,
                "engagement_day_multiplier": 1.5
            },
            "config": [{"name": "farcaster", "cast_interval": 600}],
            "tasks": [
                {"name": "post-cast", "weight": 1},
                {"name": "reply-to-cast", "weight": 2},
                {"name": "like-cast", "weight": 0, "category": "other"}
            ]
        })
    }

    #[test]
    fn test_parse_resolves_categories() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let def = AgentDefinition::from_value(&sample(), &registry).unwrap();
        assert_eq!(def.name, "MemeForge");
        assert_eq!(def.loop_delay, Duration::from_secs(30));
        assert_eq!(def.tasks[0].category, TaskCategory::Posting);
        assert_eq!(def.tasks[1].category, TaskCategory::Engagement);
        // 显式类别优先
        assert_eq!(def.tasks[2].category, TaskCategory::Other);
        assert_eq!(def.multipliers.night_multiplier, 0.4);
        assert_eq!(def.multipliers.day_hours, HourWindow::new(8, 20));
        assert_eq!(def.connection("farcaster").unwrap().u64_or("cast_interval", 900), 600);
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut value = sample();
        value.as_object_mut().unwrap().remove("tasks");
        let err = AgentDefinition::from_value(&value, &registry).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("tasks".to_string()));

        value.as_object_mut().unwrap().remove("time_based_multipliers");
        let err = AgentDefinition::from_value(&value, &registry).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField("tasks, time_based_multipliers".to_string())
        );
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut value = sample();
        value["tasks"] = json!([
            {"name": "post-cast", "weight": 1},
            {"name": "post-cast", "weight": 2}
        ]);
        assert_eq!(
            AgentDefinition::from_value(&value, &registry).unwrap_err(),
            ValidationError::DuplicateTask("post-cast".to_string())
        );
    }

    #[test]
    fn test_weights_validated() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut value = sample();
        value["tasks"] = json!([{"name": "post-cast", "weight": -1}]);
        assert!(matches!(
            AgentDefinition::from_value(&value, &registry),
            Err(ValidationError::InvalidWeight { .. })
        ));

        value["tasks"] = json!([{"name": "post-cast", "weight": 0}, {"name": "like-cast", "weight": 0}]);
        assert_eq!(
            AgentDefinition::from_value(&value, &registry).unwrap_err(),
            ValidationError::AllWeightsZero
        );

        value["tasks"] = json!([]);
        assert_eq!(
            AgentDefinition::from_value(&value, &registry).unwrap_err(),
            ValidationError::NoTasks
        );
    }

    #[test]
    fn test_unregistered_task_rejected() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut value = sample();
        value["tasks"] = json!([{"name": "launch-rocket", "weight": 1}]);
        assert_eq!(
            AgentDefinition::from_value(&value, &registry).unwrap_err(),
            ValidationError::UnregisteredTask("launch-rocket".to_string())
        );
    }

    #[test]
    fn test_inverted_window_requires_wraps() {
        let registry = ActionRegistry::with_builtin().unwrap();
        let mut value = sample();
        value["time_based_multipliers"] = json!({"night_hours": {"start": 22, "end": 3}});
        assert!(matches!(
            AgentDefinition::from_value(&value, &registry),
            Err(ValidationError::InvalidHourWindow { start: 22, end: 3 })
        ));

        value["time_based_multipliers"] = json!({"night_hours": {"start": 22, "end": 3, "wraps": true}});
        let def = AgentDefinition::from_value(&value, &registry).unwrap();
        assert!(def.multipliers.night_hours.contains(23));
        assert_eq!(def.multipliers.day_multiplier, 1.5);
    }

    #[test]
    fn test_record_label() {
        assert_eq!(record_label(&json!({"name": "A"}), 0), "A");
        assert_eq!(record_label(&json!({"bio": []}), 3), "#3");
    }
}
