//! Headless Sidekick 运行时
//!
//! 供任意前端调用的无界面入口：每个 turn 从会话存储取出状态，播种本轮，跑完单轮循环后整体写回。
//! 循环中途出错时不写回，存储里的会话状态保持本轮开始前的样子，调用方可以直接重试。
//! 工具注册表在所有会话间共享且只读，teardown 时统一释放其持有的外部资源。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::SuperstepSection;
use crate::core::{AgentError, SessionState, SessionStore};
use crate::memory::Role;
use crate::react::{run_superstep, Actor, Judge, LoopEvent, SuperstepSession, TurnOutcome};
use crate::tools::ToolExecutor;

/// 展示用的对话条目（调用方维护的显示历史）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub role: Role,
    pub content: String,
}

impl DisplayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sidekick 运行时：Actor、Judge、共享的工具执行器与会话存储
pub struct Sidekick {
    actor: Actor,
    judge: Judge,
    executor: Arc<ToolExecutor>,
    store: Arc<dyn SessionStore>,
    settings: SuperstepSection,
    event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl Sidekick {
    pub(crate) fn from_parts(
        actor: Actor,
        judge: Judge,
        executor: Arc<ToolExecutor>,
        store: Arc<dyn SessionStore>,
        settings: SuperstepSection,
        event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
    ) -> Self {
        Self {
            actor,
            judge,
            executor,
            store,
            settings,
            event_tx,
        }
    }

    /// 生成新的会话 ID
    pub fn new_session_id() -> String {
        format!("session_{}", uuid::Uuid::new_v4())
    }

    /// 跑一轮并返回结构化结果
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_message: &str,
        criterion: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let criterion = self.settings.criterion_or_default(criterion).to_string();
        let mut state = self.store.get(session_id).await;
        state.begin_turn(user_message, &criterion, self.settings.feedback_policy);
        tracing::info!(session_id, criterion = %criterion, "Turn started");

        let mut session =
            SuperstepSession::new(&self.actor, &self.judge, &self.executor, self.settings.max_steps);
        if let Some(tx) = &self.event_tx {
            session = session.with_event_tx(tx);
        }

        let (state, outcome) = match run_superstep(&session, state).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Turn failed, session state left unchanged");
                return Err(e);
            }
        };
        self.store.save(session_id, state).await;
        Ok(outcome)
    }

    /// 跑一轮并把 [用户消息, 回答, 评审反馈] 追加到调用方的显示历史；
    /// 步数耗尽前没有纯文本回答时不追加回答条目
    pub async fn turn(
        &self,
        session_id: &str,
        user_message: &str,
        criterion: &str,
        mut history: Vec<DisplayMessage>,
    ) -> Result<Vec<DisplayMessage>, AgentError> {
        let outcome = self.run_turn(session_id, user_message, criterion).await?;
        history.push(DisplayMessage::user(user_message));
        if let Some(answer) = outcome.answer {
            history.push(DisplayMessage::assistant(answer));
        }
        history.push(DisplayMessage::assistant(outcome.feedback));
        Ok(history)
    }

    /// 丢弃会话状态；之后再用同一 ID 会得到空 transcript
    pub async fn reset(&self, session_id: &str) {
        self.store.reset(session_id).await;
    }

    /// 会话当前状态（不存在时创建默认状态）
    pub async fn session_state(&self, session_id: &str) -> SessionState {
        self.store.get(session_id).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }

    /// 释放工具注册表持有的外部资源；重复调用无副作用
    pub async fn teardown(&self) -> Result<(), AgentError> {
        tracing::info!("Tearing down tool registry");
        self.executor.registry().close_all().await
    }
}
