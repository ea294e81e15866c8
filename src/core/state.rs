//! 状态定义：SessionState 与循环阶段 LoopPhase
//!
//! SessionState 是单个会话在多轮之间保存的全部内容；LoopPhase 是单轮内状态机的位置。

use serde::{Deserialize, Serialize};

use crate::config::FeedbackPolicy;
use crate::memory::Message;
use crate::react::Judgment;

/// 评审反馈消息前缀
pub const FEEDBACK_PREFIX: &str = "Evaluator Feedback on this answer:";

/// 会话状态（按 session id 保存）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub transcript: Vec<Message>,
    pub success_criterion: String,
    /// 上一次评审的否决意见
    pub feedback: Option<String>,
    pub criterion_met: bool,
    pub input_needed: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮：按策略处理旧反馈，覆盖成功标准，清空两个终止标志，追加用户消息
    pub fn begin_turn(&mut self, user_message: &str, criterion: &str, policy: FeedbackPolicy) {
        let criterion_changed = self.success_criterion != criterion;
        match policy {
            FeedbackPolicy::ClearEachTurn => self.feedback = None,
            FeedbackPolicy::ClearOnCriterionChange if criterion_changed => self.feedback = None,
            FeedbackPolicy::ClearOnCriterionChange | FeedbackPolicy::Carry => {}
        }
        self.success_criterion = criterion.to_string();
        self.criterion_met = false;
        self.input_needed = false;
        self.transcript.push(Message::user(user_message));
    }

    /// 写入评审结果并追加一条反馈摘要消息；标准满足时清除 feedback
    pub fn apply_judgment(&mut self, judgment: &Judgment) {
        self.transcript.push(Message::assistant(format!(
            "{} {}",
            FEEDBACK_PREFIX, judgment.feedback
        )));
        self.criterion_met = judgment.criterion_met;
        self.input_needed = judgment.input_needed;
        self.feedback = if judgment.criterion_met {
            None
        } else {
            Some(judgment.feedback.clone())
        };
    }

    /// 本轮是否已可结束
    pub fn is_settled(&self) -> bool {
        self.criterion_met || self.input_needed
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.transcript.last()
    }
}

/// 单轮状态机的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Acting,
    Dispatching,
    Judging,
    Done,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopPhase::Acting => "acting",
            LoopPhase::Dispatching => "dispatching",
            LoopPhase::Judging => "judging",
            LoopPhase::Done => "done",
        };
        f.write_str(s)
    }
}
