//! 动作层：任务 Handler 与注册表
//!
//! 内置动作表在 register_builtin 中一次性声明，启动时构建，无导入副作用。

pub mod mentions;
pub mod prompts;
pub mod registry;
pub mod respond;
pub mod social;

pub use mentions::RespondToMentions;
pub use registry::{Action, ActionContext, ActionRegistry, InputSource};
pub use respond::RespondToMessage;
pub use social::{LikeAction, Platform, PostAction, ReplyAction};

use crate::core::AgentError;

/// 内置动作表
pub fn register_builtin(registry: &mut ActionRegistry) -> Result<(), AgentError> {
    for platform in [Platform::Farcaster, Platform::Twitter] {
        registry.register(PostAction::new(platform))?;
        registry.register(ReplyAction::new(platform))?;
        registry.register(LikeAction::new(platform))?;
    }
    registry.register(RespondToMentions)?;
    registry.register(RespondToMessage)?;
    Ok(())
}
