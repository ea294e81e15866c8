//! Mock LLM 客户端（用于测试与无 API Key 运行）
//!
//! 按脚本依次返回预设的回复与评审结果；脚本耗尽后回显最后一条 User 消息，评审默认通过。
//! 每次调用看到的消息列表都会被记录，便于测试断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    judgments: Mutex<VecDeque<Result<serde_json::Value, LlmError>>>,
    completion_calls: Mutex<Vec<Vec<Message>>>,
    structured_calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条 complete 的返回
    pub fn with_reply(self, reply: Message) -> Self {
        self.push_reply(Ok(reply));
        self
    }

    /// 追加一条 complete_structured 的返回
    pub fn with_judgment(self, judgment: serde_json::Value) -> Self {
        self.push_judgment(Ok(judgment));
        self
    }

    pub fn push_reply(&self, reply: Result<Message, LlmError>) {
        lock(&self.replies).push_back(reply);
    }

    pub fn push_judgment(&self, judgment: Result<serde_json::Value, LlmError>) {
        lock(&self.judgments).push_back(judgment);
    }

    /// 每次 complete 调用时的消息快照
    pub fn completion_calls(&self) -> Vec<Vec<Message>> {
        lock(&self.completion_calls).clone()
    }

    /// 每次 complete_structured 调用时的消息快照
    pub fn structured_calls(&self) -> Vec<Vec<Message>> {
        lock(&self.structured_calls).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<Message, LlmError> {
        lock(&self.completion_calls).push(messages.to_vec());
        if let Some(reply) = lock(&self.replies).pop_front() {
            return reply;
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Message::assistant(format!("Echo from Mock: {}", last_user)))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema_name: &str,
        _schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        lock(&self.structured_calls).push(messages.to_vec());
        if let Some(judgment) = lock(&self.judgments).pop_front() {
            return judgment;
        }
        Ok(json!({
            "feedback": "Mock evaluator accepts the answer.",
            "criterion_met": true,
            "input_needed": false
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::new().with_reply(Message::assistant("scripted"));
        let msgs = vec![Message::user("ping")];
        let first = mock.complete(&msgs, &[]).await.unwrap();
        assert_eq!(first.content, "scripted");
        let second = mock.complete(&msgs, &[]).await.unwrap();
        assert_eq!(second.content, "Echo from Mock: ping");
        assert_eq!(mock.completion_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_default_judgment_accepts() {
        let mock = MockLlmClient::new();
        let v = mock
            .complete_structured(&[Message::user("x")], "judgment", json!({}))
            .await
            .unwrap();
        assert_eq!(v["criterion_met"], json!(true));
        assert_eq!(mock.structured_calls().len(), 1);
    }
}
