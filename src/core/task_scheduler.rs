//! 任务调度：按时段调整权重后加权随机选择
//!
//! 纯函数：静态权重 ->（可选）按类别与小时窗口乘以系数 -> 按调整后权重抽样。
//! 随机源可注入，固定种子下结果可复现。

use chrono::Timelike;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 任务类别（加载时确定，不做名称子串匹配）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// 主动发帖，夜间抑制
    Posting,
    /// 回复、点赞等互动，白天加成
    Engagement,
    #[default]
    Other,
}

/// 小时窗口，两端闭区间；仅当 wraps 为 true 时允许跨午夜（如 22..=3）
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
    #[serde(default)]
    pub wraps: bool,
}

impl HourWindow {
    pub const fn new(start: u8, end: u8) -> Self {
        Self {
            start,
            end,
            wraps: false,
        }
    }

    pub const fn wrapping(start: u8, end: u8) -> Self {
        Self {
            start,
            end,
            wraps: true,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start <= end {
            start <= hour && hour <= end
        } else if self.wraps {
            hour >= start || hour <= end
        } else {
            false
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= 23 && self.end <= 23 && (self.start <= self.end || self.wraps)
    }
}

/// 一条时段规则：category 的任务在 window 内权重乘以 coefficient
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct MultiplierRule {
    pub category: TaskCategory,
    pub window: HourWindow,
    pub coefficient: f64,
}

/// 参与调度的任务视图
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedTask {
    pub name: String,
    pub weight: f64,
    pub category: TaskCategory,
}

/// 一次选择的结果（每周期重新生成，不持久化）
#[derive(Clone, Debug, PartialEq)]
pub struct TaskSelection {
    pub name: String,
    pub index: usize,
    pub weights: Vec<f64>,
}

/// 当前小时来源（测试时可固定）
pub trait HourClock: Send + Sync {
    fn current_hour(&self) -> u32;
}

/// 本地时区的当前小时
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl HourClock for LocalClock {
    fn current_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u32);

impl HourClock for FixedClock {
    fn current_hour(&self) -> u32 {
        self.0
    }
}

/// 按小时应用规则；多条命中规则连乘，未命中的任务保持原权重
pub fn adjust_weights(tasks: &[WeightedTask], hour: u32, rules: &[MultiplierRule]) -> Vec<f64> {
    tasks
        .iter()
        .map(|task| {
            rules
                .iter()
                .filter(|rule| rule.category == task.category && rule.window.contains(hour))
                .fold(task.weight, |weight, rule| weight * rule.coefficient)
        })
        .collect()
}

/// 归一化为采样权重：负数 / NaN 为 0；按最大值缩放，避免总和溢出
///
/// 乘法溢出得到的 +inf 表示「远大于其它任务」，此时只在这些任务之间均匀选择。
fn sampling_weights(weights: &[f64]) -> Vec<f64> {
    if weights.iter().any(|w| *w == f64::INFINITY) {
        return weights
            .iter()
            .map(|w| if *w == f64::INFINITY { 1.0 } else { 0.0 })
            .collect();
    }
    let max = weights
        .iter()
        .copied()
        .filter(|w| w.is_finite() && *w > 0.0)
        .fold(0.0, f64::max);
    weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { w / max } else { 0.0 })
        .collect()
}

/// 选出一个任务；调整后所有权重为 0 时返回 NoSelectableTask
pub fn select_task<R: Rng + ?Sized>(
    tasks: &[WeightedTask],
    use_time_adjustment: bool,
    hour: u32,
    rules: &[MultiplierRule],
    rng: &mut R,
) -> Result<TaskSelection, AgentError> {
    let weights = if use_time_adjustment {
        adjust_weights(tasks, hour, rules)
    } else {
        tasks.iter().map(|t| t.weight).collect()
    };

    let dist = WeightedIndex::new(sampling_weights(&weights))
        .map_err(|_| AgentError::NoSelectableTask)?;
    let index = dist.sample(rng);

    Ok(TaskSelection {
        name: tasks[index].name.clone(),
        index,
        weights,
    })
}
