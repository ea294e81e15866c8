//! Judge：按成功标准评审 Actor 的最终回答
//!
//! 把 transcript 渲染成线性对话（工具请求只显示为 "[tool use]"，工具结果与 system 省略），
//! 连同成功标准、最新回答、上一次反馈交给结构化输出接口，解析为 Judgment。
//! 评审者可以使用与 Actor 不同的模型，避免自我认同。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, SessionState};
use crate::llm::LlmClient;
use crate::memory::{last_plain_answer, Message, Role};

/// 评审结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Judgment {
    /// Feedback on the assistant's response
    pub feedback: String,
    /// Whether the success criterion has been met
    pub criterion_met: bool,
    /// True if more input is needed from the user, or clarification, or the assistant is stuck
    pub input_needed: bool,
}

impl Judgment {
    /// Judgment 的 JSON Schema（去掉 $schema 元字段）
    pub fn schema() -> serde_json::Value {
        let mut schema = serde_json::to_value(schemars::schema_for!(Judgment))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
        }
        schema
    }
}

const SCHEMA_NAME: &str = "judgment";

const SYSTEM_PROMPT: &str = "You are an evaluator that determines if a task has been completed successfully by an Assistant.\n\
Assess the Assistant's last response against the given criterion. Respond with your feedback, \
your decision on whether the success criterion has been met, and whether more input is needed from the user.";

/// 渲染对话历史：只保留 User / Assistant，工具请求折叠为 [tool use]
pub fn format_conversation(messages: &[Message]) -> String {
    let mut conversation = String::from("Conversation history:\n\n");
    for m in messages {
        match m.role {
            Role::User => conversation.push_str(&format!("User: {}\n", m.content)),
            Role::Assistant if m.has_tool_calls() => conversation.push_str("Assistant: [tool use]\n"),
            Role::Assistant => conversation.push_str(&format!("Assistant: {}\n", m.content)),
            Role::System | Role::Tool => {}
        }
    }
    conversation
}

/// 构建评审 user prompt
pub fn build_assessment_prompt(
    transcript: &[Message],
    criterion: &str,
    last_answer: &str,
    prior_feedback: Option<&str>,
) -> String {
    let mut s = format!(
        "You are evaluating a conversation between the User and Assistant. \
         You decide what action to take based on the last response from the Assistant.\n\n\
         The entire conversation with the assistant, with the user's original request and all replies, is:\n\
         {}\n\
         The success criterion for this assignment is:\n{}\n\n\
         And the final response from the Assistant that you are evaluating is:\n{}\n\n\
         Respond with your feedback, and decide if the success criterion is met by this response.\n\
         Also decide if more user input is required, either because the assistant has a question, \
         needs clarification, or seems to be stuck and unable to answer without help.\n\n\
         The Assistant has access to tools with side effects, such as writing files. \
         If the Assistant says it has done something, such as writing a file, assume it has done so. \
         Give the Assistant the benefit of the doubt for claimed actions, \
         but reject if you feel more work should go into this.\n",
        format_conversation(transcript),
        criterion,
        last_answer
    );
    if let Some(feedback) = prior_feedback {
        s.push_str(&format!(
            "\nIn a prior attempt from the Assistant, you provided this feedback: {}\n\
             If you see the Assistant repeating the same mistakes, respond that user input is required.\n",
            feedback
        ));
    }
    s
}

/// Judge：持有评审用 LLM
pub struct Judge {
    llm: Arc<dyn LlmClient>,
}

impl Judge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取评审 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 评审当前 state 中最新的纯文本回答；不修改 state
    pub async fn assess(&self, state: &SessionState) -> Result<Judgment, AgentError> {
        let last_answer = last_plain_answer(&state.transcript).unwrap_or_default();
        let prompt = build_assessment_prompt(
            &state.transcript,
            &state.success_criterion,
            last_answer,
            state.feedback.as_deref(),
        );
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];

        let value = self
            .llm
            .complete_structured(&messages, SCHEMA_NAME, Judgment::schema())
            .await?;
        let judgment: Judgment = serde_json::from_value(value.clone())
            .map_err(|e| AgentError::MalformedJudgment(format!("{}: {}", e, value)))?;

        tracing::info!(
            criterion_met = judgment.criterion_met,
            input_needed = judgment.input_needed,
            "Judgment received"
        );
        Ok(judgment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::ToolCall;
    use serde_json::json;

    #[test]
    fn test_format_conversation_hides_tool_traffic() {
        let call = ToolCall::new("c1", "lookup", json!({}));
        let transcript = vec![
            Message::system("instructions"),
            Message::user("find it"),
            Message::tool_request("", vec![call.clone()]),
            Message::tool_result(&call, "secret payload", false),
            Message::assistant("found"),
        ];
        let text = format_conversation(&transcript);
        assert!(text.contains("User: find it"));
        assert!(text.contains("Assistant: [tool use]"));
        assert!(text.contains("Assistant: found"));
        assert!(!text.contains("secret payload"));
        assert!(!text.contains("instructions"));
    }

    #[test]
    fn test_prompt_mentions_prior_feedback() {
        let p = build_assessment_prompt(&[], "c", "a", Some("missing word"));
        assert!(p.contains("missing word"));
        assert!(p.contains("repeating the same mistakes"));
        let p = build_assessment_prompt(&[], "c", "a", None);
        assert!(!p.contains("prior attempt"));
    }

    #[test]
    fn test_schema_has_three_fields() {
        let schema = Judgment::schema();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("feedback"));
        assert!(props.contains_key("criterion_met"));
        assert!(props.contains_key("input_needed"));
        assert!(schema.get("$schema").is_none());
    }

    #[tokio::test]
    async fn test_assess_evaluates_last_plain_answer() {
        let mock = Arc::new(MockLlmClient::new().with_judgment(json!({
            "feedback": "ok", "criterion_met": true, "input_needed": false
        })));
        let judge = Judge::new(mock.clone());
        let mut state = SessionState::new();
        state.success_criterion = "crit".to_string();
        state.transcript = vec![Message::user("q"), Message::assistant("final words")];

        let j = judge.assess(&state).await.unwrap();
        assert!(j.criterion_met);
        let seen = mock.structured_calls();
        assert!(seen[0][1].content.contains("final words"));
    }

    #[tokio::test]
    async fn test_malformed_judgment() {
        let mock = Arc::new(MockLlmClient::new().with_judgment(json!({ "verdict": "yes" })));
        let judge = Judge::new(mock);
        let err = judge.assess(&SessionState::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedJudgment(_)));
    }

    struct MeteredLlm;

    #[async_trait::async_trait]
    impl LlmClient for MeteredLlm {
        fn token_usage(&self) -> (u64, u64, u64) {
            (7, 3, 10)
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[crate::llm::ToolSpec],
        ) -> Result<Message, crate::llm::LlmError> {
            Ok(Message::assistant("unused"))
        }

        async fn complete_structured(
            &self,
            _messages: &[Message],
            _schema_name: &str,
            _schema: serde_json::Value,
        ) -> Result<serde_json::Value, crate::llm::LlmError> {
            Ok(json!({ "feedback": "ok", "criterion_met": true, "input_needed": false }))
        }
    }

    #[test]
    fn test_token_usage_reports_evaluator_client() {
        let judge = Judge::new(Arc::new(MeteredLlm));
        assert_eq!(judge.token_usage(), (7, 3, 10));
    }
}
