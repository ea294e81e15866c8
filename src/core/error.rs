//! Agent 错误类型
//!
//! 工具侧错误（HallucinatedTool / ToolExecutionFailed / ToolTimeout）由调度器就地转成错误结果消息；
//! LLM 与评审错误直接返回给 turn 的调用方。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    /// toolkit 打开失败，运行时不会被创建
    #[error("Tool setup failed ({toolkit}): {reason}")]
    ToolSetup { toolkit: String, reason: String },

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
