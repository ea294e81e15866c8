//! 路由：状态机的转移函数
//!
//! Acting 之后只看最后一条消息是否带工具请求；Judging 之后只看两个终止标志。

use crate::core::{LoopPhase, SessionState};
use crate::memory::Message;

/// Acting -> Dispatching（最后一条消息带工具请求）或 Judging
pub fn route_after_acting(transcript: &[Message]) -> LoopPhase {
    match transcript.last() {
        Some(m) if m.has_tool_calls() => LoopPhase::Dispatching,
        _ => LoopPhase::Judging,
    }
}

/// Dispatching 之后总是回到 Acting
pub fn route_after_dispatching() -> LoopPhase {
    LoopPhase::Acting
}

/// Judging -> Done（标准满足或需要用户输入）或 Acting（带反馈重试）
pub fn route_after_judging(state: &SessionState) -> LoopPhase {
    if state.is_settled() {
        LoopPhase::Done
    } else {
        LoopPhase::Acting
    }
}
