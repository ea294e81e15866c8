//! 会话存储抽象层
//!
//! 以 session id 为唯一键保存 SessionState；当前提供内存实现，接口保持 async 以便换成持久化后端。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::SessionState;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 获取会话状态，不存在时创建默认状态并保存
    async fn get(&self, session_id: &str) -> SessionState;

    /// 保存会话状态（整体覆盖）
    async fn save(&self, session_id: &str, state: SessionState);

    /// 丢弃会话的全部状态；重复调用无副作用
    async fn reset(&self, session_id: &str);

    async fn contains(&self, session_id: &str) -> bool;

    /// 当前保存的会话数
    async fn len(&self) -> usize;
}

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> SessionState {
        if let Some(state) = self.sessions.read().await.get(session_id) {
            return state.clone();
        }
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    async fn save(&self, session_id: &str, state: SessionState) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state);
    }

    async fn reset(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            tracing::info!(session_id, "Session state discarded");
        }
    }

    async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_get_creates_default() {
        let store = MemorySessionStore::new();
        assert!(!store.contains("s1").await);
        let state = store.get("s1").await;
        assert_eq!(state, SessionState::default());
        assert!(store.contains("s1").await);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let store = MemorySessionStore::new();
        let mut state = SessionState::new();
        state.transcript.push(Message::user("hi"));
        state.criterion_met = true;
        store.save("s1", state).await;

        store.reset("s1").await;
        let once = store.get("s1").await;
        store.reset("s1").await;
        store.reset("s1").await;
        let twice = store.get("s1").await;

        assert_eq!(once, twice);
        assert!(twice.transcript.is_empty());
        assert!(!twice.criterion_met);
        assert!(!twice.input_needed);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = MemorySessionStore::new();
        let mut a = SessionState::new();
        a.feedback = Some("fix it".to_string());
        store.save("a", a).await;
        let b = store.get("b").await;
        assert_eq!(b.feedback, None);
        assert_eq!(store.len().await, 2);
    }
}
