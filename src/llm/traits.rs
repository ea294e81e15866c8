//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：
//! complete（带工具的对话补全，返回一条消息）与 complete_structured（按 JSON Schema 返回结构化结果）。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::Message;

/// 提供给模型的工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: serde_json::Value,
}

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 对话补全：返回纯文本回复，或带一个或多个工具请求的 assistant 消息
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError>;

    /// 结构化输出：按 schema 返回 JSON 对象
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
