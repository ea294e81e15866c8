//! Actor：拼装带情境的 system 指令并调用 LLM
//!
//! 指令包含成功标准、当前时间，以及上一次被否决时的评审意见。
//! 指令作为唯一的前导 system 消息安装进 transcript，然后带上工具列表调用 LLM，追加且只追加一条回复。

use std::sync::Arc;

use chrono::Local;

use crate::core::{AgentError, SessionState};
use crate::llm::{LlmClient, ToolSpec};
use crate::memory::{install_system_message, Message};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 构建 Actor 的 system 指令
pub fn build_instructions(criterion: &str, feedback: Option<&str>, now: &str) -> String {
    let mut s = format!(
        "You are a helpful assistant that can use tools to complete tasks.\n\
         Keep working on the task until either you have a question or clarification for the user, \
         or the success criterion is met.\n\
         The current date and time is {now}\n\n\
         This is the success criterion:\n{criterion}\n\n\
         Reply either with a question for the user about this assignment, or with your final response.\n\
         If you have a question for the user, state it clearly, for example:\n\n\
         Question: please clarify whether you want a summary or a detailed answer\n\n\
         If you've finished, reply with the final answer only, without asking a question."
    );
    if let Some(feedback) = feedback {
        s.push_str(&format!(
            "\n\nPreviously you thought you completed the assignment, but your reply was rejected \
             because the success criterion was not met.\n\
             Here is the feedback on why it was rejected:\n{feedback}\n\
             With this feedback, continue the assignment, making sure you meet the success criterion \
             or have a question for the user."
        ));
    }
    s
}

/// Actor：持有执行用 LLM
pub struct Actor {
    llm: Arc<dyn LlmClient>,
}

impl Actor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 运行一次：返回安装了新 system 消息并追加回复后的 transcript，不修改 state
    pub async fn act(&self, state: &SessionState, tools: &[ToolSpec]) -> Result<Vec<Message>, AgentError> {
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let instructions =
            build_instructions(&state.success_criterion, state.feedback.as_deref(), &now);
        let mut messages = install_system_message(&state.transcript, &instructions);
        tracing::debug!(messages = messages.len(), tools = tools.len(), "Actor invoking LLM");

        let reply = self.llm.complete(&messages, tools).await?;
        messages.push(reply);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::Role;

    #[test]
    fn test_instructions_embed_criterion_and_time() {
        let s = build_instructions("must say done", None, "2026-01-02 03:04:05");
        assert!(s.contains("must say done"));
        assert!(s.contains("2026-01-02 03:04:05"));
        assert!(!s.contains("rejected"));
    }

    #[test]
    fn test_instructions_embed_feedback() {
        let s = build_instructions("c", Some("missing required word"), "now");
        assert!(s.contains("rejected"));
        assert!(s.contains("missing required word"));
    }

    #[tokio::test]
    async fn test_act_appends_one_message_and_single_system() {
        let mock = Arc::new(MockLlmClient::new().with_reply(Message::assistant("answer")));
        let actor = Actor::new(mock.clone());

        let mut state = SessionState::new();
        state.success_criterion = "crit".to_string();
        state.transcript = vec![Message::system("stale"), Message::user("task")];

        let out = actor.act(&state, &[]).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.iter().filter(|m| m.role == Role::System).count(), 1);
        assert!(out[0].content.contains("crit"));
        assert_eq!(out[2].content, "answer");
        // state 本身不变
        assert_eq!(state.transcript[0].content, "stale");

        let seen = mock.completion_calls();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][0].role, Role::System);
    }
}
