//! 对话记录：消息类型与 transcript 纯函数
//!
//! Message 以 Role 枚举区分 system / user / assistant / tool，
//! 工具请求（tool_calls）与工具结果（tool_result）作为显式负载挂在消息上，不靠字段探测。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发起的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 调用 ID，工具结果通过它与请求对应
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 工具结果所对应的请求
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRef {
    pub call_id: String,
    pub tool: String,
    pub is_error: bool,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 非空表示这是一条工具请求消息（role = Assistant）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// 存在表示这是一条工具结果消息（role = Tool）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultRef>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 带工具请求的 assistant 消息；content 可以为空
    pub fn tool_request(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            tool_result: Some(ToolResultRef {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                is_error,
            }),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// 是否带有待执行的工具请求
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// 安装唯一的前导 system 消息，返回新的 transcript，不修改入参。
///
/// 已有的 system 消息全部移除，新内容放在位置 0，其余消息保持原顺序。
pub fn install_system_message(transcript: &[Message], content: &str) -> Vec<Message> {
    let mut out = Vec::with_capacity(transcript.len() + 1);
    out.push(Message::system(content));
    out.extend(transcript.iter().filter(|m| !m.is_system()).cloned());
    out
}

/// 最后一条不带工具请求的 assistant 消息内容
pub fn last_plain_answer(transcript: &[Message]) -> Option<&str> {
    transcript
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.has_tool_calls())
        .map(|m| m.content.as_str())
}
