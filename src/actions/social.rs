//! 社交平台动作：发帖 / 回复 / 点赞（Farcaster 与 Twitter 共用实现）
//!
//! 回复与点赞消费工作记忆中的时间线队列，时间线由循环的补货步骤按需拉取。

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::actions::prompts::{post_prompt, reply_prompt};
use crate::actions::{Action, ActionContext, InputSource};
use crate::agent::{AgentDefinition, PlatformIdentity};
use crate::core::task_scheduler::TaskCategory;
use crate::core::AgentError;

const DEFAULT_POST_INTERVAL_SECS: u64 = 900;
const DEFAULT_OWN_REPLIES_COUNT: u64 = 2;
const DEFAULT_TIMELINE_READ_COUNT: u64 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Farcaster,
    Twitter,
}

impl Platform {
    /// provider 名称，同时也是 Agent 定义 config 中的连接名
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Farcaster => "farcaster",
            Self::Twitter => "twitter",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            Self::Farcaster => "cast",
            Self::Twitter => "tweet",
        }
    }

    fn char_limit(&self) -> usize {
        match self {
            Self::Farcaster => 320,
            Self::Twitter => 280,
        }
    }

    pub fn timeline_key(&self) -> String {
        format!("timeline_{}s", self.noun())
    }

    fn last_post_key(&self) -> String {
        format!("last_{}_time", self.noun())
    }

    fn post_op(&self) -> String {
        format!("post-{}", self.noun())
    }

    fn reply_op(&self) -> String {
        format!("reply-to-{}", self.noun())
    }

    fn like_op(&self) -> String {
        format!("like-{}", self.noun())
    }

    fn replies_op(&self) -> String {
        format!("get-{}-replies", self.noun())
    }

    fn id_field(&self) -> &'static str {
        match self {
            Self::Farcaster => "hash",
            Self::Twitter => "id",
        }
    }

    fn author_field(&self) -> &'static str {
        match self {
            Self::Farcaster => "author_fid",
            Self::Twitter => "author_username",
        }
    }

    fn setting(&self, definition: &AgentDefinition, key: &str, default: u64) -> u64 {
        definition
            .connection(self.provider())
            .map_or(default, |c| c.u64_or(key, default))
    }

    /// 回复接口参数：Farcaster 需要父帖作者 FID
    fn reply_args(&self, id: &str, author: &str, text: &str) -> Value {
        match self {
            Self::Farcaster => json!([author, id, text]),
            Self::Twitter => json!([id, text]),
        }
    }

    fn is_own(&self, author: &str, identity: &PlatformIdentity) -> bool {
        match self {
            Self::Farcaster => identity
                .farcaster_fid
                .is_some_and(|fid| fid.to_string() == author),
            Self::Twitter => identity
                .twitter_username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(author)),
        }
    }

    fn timeline_input(&self, definition: &AgentDefinition) -> InputSource {
        InputSource {
            key: self.timeline_key(),
            provider: self.provider().to_string(),
            operation: "read-timeline".to_string(),
            args: json!([self.setting(definition, "timeline_read_count", DEFAULT_TIMELINE_READ_COUNT)]),
        }
    }
}

/// 字符串或数字字段统一取为字符串
pub(crate) fn field_str(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 发帖：距上次发帖未满间隔时跳过
pub struct PostAction {
    platform: Platform,
    name: String,
}

impl PostAction {
    pub fn new(platform: Platform) -> Self {
        Self {
            name: platform.post_op(),
            platform,
        }
    }
}

#[async_trait]
impl Action for PostAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Posting
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, _args: &Value) -> Result<bool, AgentError> {
        let platform = self.platform;
        let interval_key = format!("{}_interval", platform.noun());
        let interval = platform.setting(ctx.definition, &interval_key, DEFAULT_POST_INTERVAL_SECS);
        let now = Utc::now();

        if let Some(last) = ctx.runtime.memory.timestamp(&platform.last_post_key()) {
            if (now - last).num_seconds() < interval as i64 {
                tracing::info!(agent = %ctx.definition.name, "Delaying {} until interval elapses", platform.noun());
                return Ok(false);
            }
        }

        let prompt = post_prompt(&ctx.definition.name, platform.noun(), platform.char_limit());
        let Some(text) = ctx.generate_text(&prompt).await? else {
            return Ok(false);
        };

        tracing::info!(agent = %ctx.definition.name, "Posting {}: '{}'", platform.noun(), text);
        ctx.invoke(platform.provider(), &platform.post_op(), json!([text]))
            .await?;
        ctx.runtime.memory.set_timestamp(&platform.last_post_key(), now);
        Ok(true)
    }
}

/// 回复时间线队首的帖子
pub struct ReplyAction {
    platform: Platform,
    name: String,
}

impl ReplyAction {
    pub fn new(platform: Platform) -> Self {
        Self {
            name: platform.reply_op(),
            platform,
        }
    }
}

#[async_trait]
impl Action for ReplyAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Engagement
    }

    fn inputs(&self, definition: &AgentDefinition) -> Vec<InputSource> {
        vec![self.platform.timeline_input(definition)]
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, _args: &Value) -> Result<bool, AgentError> {
        let platform = self.platform;
        let Some(item) = ctx.runtime.memory.pop_front(&platform.timeline_key()) else {
            tracing::info!(agent = %ctx.definition.name, "No {}s to reply to", platform.noun());
            return Ok(false);
        };
        let (Some(id), Some(author)) = (
            field_str(&item, platform.id_field()),
            field_str(&item, platform.author_field()),
        ) else {
            return Ok(false);
        };
        let original = item.get("text").and_then(Value::as_str).unwrap_or_default();

        let Some(reply) = ctx
            .generate_text(&reply_prompt(original, platform.char_limit()))
            .await?
        else {
            return Ok(false);
        };

        tracing::info!(agent = %ctx.definition.name, target = %id, "Posting reply: '{}'", reply);
        ctx.invoke(
            platform.provider(),
            &platform.reply_op(),
            platform.reply_args(&id, &author, &reply),
        )
        .await?;
        Ok(true)
    }
}

/// 点赞时间线队首的帖子；若是自己的帖子，改为把它的若干回复放入队列
pub struct LikeAction {
    platform: Platform,
    name: String,
}

impl LikeAction {
    pub fn new(platform: Platform) -> Self {
        Self {
            name: platform.like_op(),
            platform,
        }
    }
}

#[async_trait]
impl Action for LikeAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Engagement
    }

    fn inputs(&self, definition: &AgentDefinition) -> Vec<InputSource> {
        vec![self.platform.timeline_input(definition)]
    }

    async fn execute(&self, ctx: &mut ActionContext<'_>, _args: &Value) -> Result<bool, AgentError> {
        let platform = self.platform;
        let timeline_key = platform.timeline_key();
        let Some(item) = ctx.runtime.memory.pop_front(&timeline_key) else {
            tracing::info!(agent = %ctx.definition.name, "No {}s to like", platform.noun());
            return Ok(false);
        };
        let Some(id) = field_str(&item, platform.id_field()) else {
            return Ok(false);
        };

        let own = field_str(&item, platform.author_field())
            .is_some_and(|author| platform.is_own(&author, &ctx.runtime.identity));
        if own {
            let count = platform.setting(
                ctx.definition,
                &format!("own_{}_replies_count", platform.noun()),
                DEFAULT_OWN_REPLIES_COUNT,
            ) as usize;
            let replies = ctx
                .invoke(platform.provider(), &platform.replies_op(), json!([id]))
                .await?;
            if let Value::Array(replies) = replies {
                ctx.runtime
                    .memory
                    .extend_queue(&timeline_key, replies.into_iter().take(count));
            }
            tracing::info!(
                agent = %ctx.definition.name,
                queued = ctx.runtime.memory.queue_len(&timeline_key),
                "Own {} {}, queued replies instead of liking",
                platform.noun(),
                id
            );
            return Ok(true);
        }

        tracing::info!(agent = %ctx.definition.name, target = %id, "Liking {}", platform.noun());
        ctx.invoke(platform.provider(), &platform.like_op(), json!([id]))
            .await?;
        Ok(true)
    }
}
