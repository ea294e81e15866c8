//! Sidekick 构建器：统一的初始化逻辑
//!
//! 从配置选择 LLM 后端（执行者与评审者可用不同模型），注册工具与 toolkit，组装会话存储。
//! toolkit 打开失败时关闭已打开的 toolkit 并返回错误，不产生半初始化的运行时。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::Sidekick;
use crate::config::AppConfig;
use crate::core::{AgentError, MemorySessionStore, SessionStore};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, DEEPSEEK_BASE_URL};
use crate::react::{Actor, Judge, LoopEvent};
use crate::tools::{Tool, ToolExecutor, ToolRegistry, Toolkit};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / DeepSeek / Mock）
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        "deepseek" => {
            let key = std::env::var("DEEPSEEK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            match key {
                Some(key) => {
                    let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
                    tracing::info!("Using DeepSeek LLM ({})", model);
                    Arc::new(OpenAiClient::new(Some(base), model, Some(&key), timeout))
                }
                None => {
                    tracing::warn!("DEEPSEEK_API_KEY not set, using Mock LLM");
                    Arc::new(MockLlmClient::new())
                }
            }
        }
        _ => match std::env::var("OPENAI_API_KEY").ok() {
            Some(key) => {
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    model,
                    Some(&key),
                    timeout,
                ))
            }
            None => {
                tracing::warn!("No API key set or provider unknown, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        },
    }
}

/// Sidekick 构建器
pub struct SidekickBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    evaluator_llm: Option<Arc<dyn LlmClient>>,
    tools: Vec<Arc<dyn Tool>>,
    toolkits: Vec<Arc<dyn Toolkit>>,
    store: Option<Arc<dyn SessionStore>>,
    event_tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl SidekickBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            evaluator_llm: None,
            tools: Vec::new(),
            toolkits: Vec::new(),
            store: None,
            event_tx: None,
        }
    }

    /// 指定执行者 LLM（未指定时按配置创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定评审者 LLM（未指定时：配置了 evaluator_model 则单独创建，否则与执行者共用）
    pub fn with_evaluator_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.evaluator_llm = Some(llm);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// 注册持有外部资源的 toolkit，build 时打开
    pub fn with_toolkit(mut self, toolkit: Arc<dyn Toolkit>) -> Self {
        self.toolkits.push(toolkit);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 设置事件推送通道（所有会话共用）
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 构建工具注册表；任一 toolkit 打开失败则关闭已打开的并返回错误
    pub async fn build_tool_registry(&mut self) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        for tool in self.tools.drain(..) {
            registry.register_arc(tool);
        }
        for toolkit in self.toolkits.drain(..) {
            if let Err(e) = registry.register_toolkit(toolkit).await {
                tracing::warn!(error = %e, "Toolkit setup failed, releasing opened toolkits");
                if let Err(close_err) = registry.close_all().await {
                    tracing::warn!(error = %close_err, "Releasing toolkits failed");
                }
                return Err(e);
            }
        }
        Ok(registry)
    }

    pub async fn build(mut self) -> Result<Sidekick, AgentError> {
        let registry = self.build_tool_registry().await?;
        let executor = Arc::new(ToolExecutor::new(registry, self.config.tools.tool_timeout_secs));

        let llm = match self.llm.take() {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config, &self.config.llm.model),
        };
        let evaluator_llm = match (self.evaluator_llm.take(), &self.config.llm.evaluator_model) {
            (Some(llm), _) => llm,
            (None, Some(model)) => create_llm_from_config(&self.config, model),
            (None, None) => llm.clone(),
        };
        let store = self
            .store
            .take()
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));

        tracing::info!(tools = ?executor.tool_names(), "Sidekick ready");
        Ok(Sidekick::from_parts(
            Actor::new(llm),
            Judge::new(evaluator_llm),
            executor,
            store,
            self.config.superstep.clone(),
            self.event_tx.take(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::tools::registry::tests::CountingToolkit;
    use crate::tools::EchoTool;

    #[tokio::test]
    async fn test_failed_toolkit_releases_opened_ones() {
        let good = Arc::new(CountingToolkit::new(false));
        let closed = good.closed.clone();
        let result = SidekickBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_toolkit(good)
            .with_toolkit(Arc::new(CountingToolkit::new(true)))
            .build()
            .await;
        assert!(matches!(result, Err(AgentError::ToolSetup { .. })));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_and_teardown() {
        let tk = Arc::new(CountingToolkit::new(false));
        let closed = tk.closed.clone();
        let sidekick = SidekickBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_tool(Arc::new(EchoTool))
            .with_toolkit(tk)
            .build()
            .await
            .unwrap();
        assert_eq!(sidekick.tool_names(), vec!["echo".to_string()]);
        sidekick.teardown().await.unwrap();
        sidekick.teardown().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluator_model_builds_separate_judge() {
        let actor_llm = Arc::new(MockLlmClient::new().with_judgment(serde_json::json!({
            "feedback": "rejected by the actor's client",
            "criterion_met": false,
            "input_needed": true
        })));
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.llm.evaluator_model = Some("gpt-4o".to_string());
        let sidekick = SidekickBuilder::new(cfg)
            .with_llm(actor_llm.clone())
            .build()
            .await
            .unwrap();

        let outcome = sidekick
            .run_turn(&Sidekick::new_session_id(), "hello", "")
            .await
            .unwrap();
        assert!(outcome.criterion_met);
        assert_eq!(actor_llm.completion_calls().len(), 1);
        assert!(actor_llm.structured_calls().is_empty());
    }

    #[tokio::test]
    async fn test_judge_shares_actor_llm_by_default() {
        let llm = Arc::new(MockLlmClient::new());
        let sidekick = SidekickBuilder::new(AppConfig::default())
            .with_llm(llm.clone())
            .build()
            .await
            .unwrap();

        sidekick
            .run_turn(&Sidekick::new_session_id(), "hello", "")
            .await
            .unwrap();
        assert_eq!(llm.structured_calls().len(), 1);
    }

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        let llm = create_llm_from_config(&cfg, "any");
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }
}
