//! 单轮主循环（superstep）
//!
//! Acting -> (Dispatching -> Acting)* -> Judging -> Done | Acting ...
//! 每个节点都 await 完成后才推进状态机；单轮内 Acting 次数有上限，耗尽时强制 input_needed。
//! 可选 event_tx：向 Web 等前端推送阶段切换 / 工具调用 / 回答 / 评审事件。

use tokio::sync::mpsc;

use crate::core::state::FEEDBACK_PREFIX;
use crate::core::{AgentError, LoopPhase, SessionState};
use crate::memory::Message;
use crate::react::{route_after_acting, route_after_dispatching, route_after_judging, Actor, Judge, LoopEvent};
use crate::tools::ToolExecutor;

/// 工具结果预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单轮结束时交给调用方的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Actor 本轮最后一次纯文本回答；步数耗尽前一次都没有时为 None
    pub answer: Option<String>,
    /// 最后一条消息（评审反馈摘要）
    pub feedback: String,
    pub criterion_met: bool,
    pub input_needed: bool,
    /// 本轮 Acting 次数
    pub steps: usize,
}

/// 单轮循环所需的组件
pub struct SuperstepSession<'a> {
    pub actor: &'a Actor,
    pub judge: &'a Judge,
    pub executor: &'a ToolExecutor,
    /// 单轮 Acting 次数上限（至少为 1）
    pub max_steps: usize,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a mpsc::UnboundedSender<LoopEvent>>,
}

impl<'a> SuperstepSession<'a> {
    pub fn new(actor: &'a Actor, judge: &'a Judge, executor: &'a ToolExecutor, max_steps: usize) -> Self {
        Self {
            actor,
            judge,
            executor,
            max_steps: max_steps.max(1),
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: &'a mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: LoopEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(text: &str) -> String {
    let p: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", p)
    } else {
        p
    }
}

/// 运行一轮，直到 Done。
///
/// state 需已由 `SessionState::begin_turn` 播种。任一 LLM / 评审调用失败时直接返回错误，
/// 入参 state 已被消耗，调用方保存的旧状态保持不变。
pub async fn run_superstep(
    session: &SuperstepSession<'_>,
    mut state: SessionState,
) -> Result<(SessionState, TurnOutcome), AgentError> {
    let specs = session.executor.specs();
    let mut phase = LoopPhase::Acting;
    let mut steps = 0usize;
    let mut answer: Option<String> = None;

    loop {
        session.send_event(LoopEvent::StepUpdate {
            phase,
            step: steps,
            max_steps: session.max_steps,
        });
        tracing::debug!(%phase, step = steps, "Superstep phase");

        match phase {
            LoopPhase::Acting => {
                if steps >= session.max_steps {
                    tracing::warn!(max_steps = session.max_steps, "Step limit reached, asking for user input");
                    session.send_event(LoopEvent::StepLimitReached {
                        max_steps: session.max_steps,
                    });
                    let note = format!(
                        "Stopped after {} attempts without meeting the success criterion; user input is needed.",
                        session.max_steps
                    );
                    state
                        .transcript
                        .push(Message::assistant(format!("{} {}", FEEDBACK_PREFIX, note)));
                    state.feedback = Some(note);
                    state.input_needed = true;
                    phase = LoopPhase::Done;
                    continue;
                }
                steps += 1;
                state.transcript = session.actor.act(&state, &specs).await?;
                phase = route_after_acting(&state.transcript);
                if let Some(last) = state.last_message() {
                    if phase == LoopPhase::Judging {
                        session.send_event(LoopEvent::Answer {
                            text: preview(&last.content),
                        });
                        answer = Some(last.content.clone());
                    }
                }
            }
            LoopPhase::Dispatching => {
                let calls = state
                    .last_message()
                    .map(|m| m.tool_calls.clone())
                    .unwrap_or_default();
                for call in &calls {
                    session.send_event(LoopEvent::ActionRequested {
                        tool: call.name.clone(),
                        args: call.arguments.clone(),
                    });
                }
                let results = session.executor.dispatch(&calls).await;
                for result in &results {
                    if let Some(r) = &result.tool_result {
                        session.send_event(LoopEvent::ActionResult {
                            tool: r.tool.clone(),
                            preview: preview(&result.content),
                            is_error: r.is_error,
                        });
                    }
                }
                state.transcript.extend(results);
                phase = route_after_dispatching();
            }
            LoopPhase::Judging => {
                let judgment = session.judge.assess(&state).await?;
                session.send_event(LoopEvent::Judged {
                    feedback: judgment.feedback.clone(),
                    criterion_met: judgment.criterion_met,
                    input_needed: judgment.input_needed,
                });
                state.apply_judgment(&judgment);
                phase = route_after_judging(&state);
            }
            LoopPhase::Done => break,
        }
    }

    session.send_event(LoopEvent::Done {
        criterion_met: state.criterion_met,
        input_needed: state.input_needed,
    });
    // 两者共用同一客户端时数值相同
    let (actor_prompt_tokens, actor_completion_tokens, actor_total_tokens) = session.actor.token_usage();
    let (judge_prompt_tokens, judge_completion_tokens, judge_total_tokens) = session.judge.token_usage();
    tracing::info!(
        steps,
        criterion_met = state.criterion_met,
        input_needed = state.input_needed,
        actor_prompt_tokens,
        actor_completion_tokens,
        actor_total_tokens,
        judge_prompt_tokens,
        judge_completion_tokens,
        judge_total_tokens,
        "Superstep finished"
    );

    let feedback = state
        .last_message()
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let outcome = TurnOutcome {
        answer,
        feedback,
        criterion_met: state.criterion_met,
        input_needed: state.input_needed,
        steps,
    };
    Ok((state, outcome))
}
