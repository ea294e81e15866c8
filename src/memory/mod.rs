//! 记忆层：会话 transcript（消息类型与纯函数）
//!
//! transcript 不做剪枝，长度由调用方通过 reset 控制。

pub mod conversation;

pub use conversation::{install_system_message, last_plain_answer, Message, Role, ToolCall, ToolResultRef};
