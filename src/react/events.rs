//! 循环过程事件：用于流式/SSE 展示阶段切换、工具调用、回答与评审

use serde::Serialize;

use crate::core::LoopPhase;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 进入新阶段；step 为本轮已执行的 Acting 次数
    StepUpdate {
        phase: LoopPhase,
        step: usize,
        max_steps: usize,
    },
    /// Actor 请求调用工具
    ActionRequested {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    ActionResult {
        tool: String,
        preview: String,
        is_error: bool,
    },
    /// Actor 给出的纯文本回答
    Answer { text: String },
    /// 评审结果
    Judged {
        feedback: String,
        criterion_met: bool,
        input_needed: bool,
    },
    StepLimitReached { max_steps: usize },
    /// 本轮结束
    Done {
        criterion_met: bool,
        input_needed: bool,
    },
}
