//! 文本生成用的 Prompt 模板

pub fn post_prompt(agent_name: &str, noun: &str, char_limit: usize) -> String {
    format!(
        "Write one engaging, thoughtful {noun} of at most {char_limit} characters. \
         Do not promote any token or project other than {agent_name}. \
         Do not reuse the example posts, avoid the words AI and crypto, and skip hashtags and links. \
         Offer an original take, start a conversation, or share something fun."
    )
}

pub fn reply_prompt(original: &str, char_limit: usize) -> String {
    format!(
        "Write a fun, insightful reply to this post: {original}. \
         Stay under {char_limit} characters and leave out usernames, hashtags and links. \
         The reply should add something to the conversation while keeping your tone."
    )
}

pub fn response_prompt(message: &str) -> String {
    format!("Write a fun, engaging reply to this message: {message}")
}
