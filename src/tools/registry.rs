//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 持有外部资源（浏览器句柄等）的工具通过 Toolkit 注册：open 时获取资源并产出工具，close 时释放。
//! 注册表在 setup 之后只读；close_all 只生效一次，未显式关闭时在 Drop 中交给当前 tokio 运行时关闭。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（与模型 tool call 中的 name 对应）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema，默认不限参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；参数不合法时返回 Err 描述
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 持有外部资源的工具来源：open 获取资源并返回工具列表，close 释放资源
#[async_trait]
pub trait Toolkit: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self) -> Result<Vec<Arc<dyn Tool>>, String>;

    async fn close(&self) -> Result<(), String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，并持有已打开的 Toolkit
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    toolkits: Vec<Arc<dyn Toolkit>>,
    closed: AtomicBool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
    }

    /// 打开 toolkit 并注册其工具；失败时返回 ToolSetup，toolkit 不会被持有
    pub async fn register_toolkit(&mut self, toolkit: Arc<dyn Toolkit>) -> Result<(), AgentError> {
        let tools = toolkit.open().await.map_err(|reason| AgentError::ToolSetup {
            toolkit: toolkit.name().to_string(),
            reason,
        })?;
        tracing::info!(toolkit = toolkit.name(), tools = tools.len(), "Toolkit opened");
        for tool in tools {
            self.register_arc(tool);
        }
        self.toolkits.push(toolkit);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::HallucinatedTool(name.to_string()))?;
        tool.execute(args).await.map_err(AgentError::ToolExecutionFailed)
    }

    /// 按名称排序的工具名列表
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 提供给 LLM 的工具描述（按名称排序，保证请求稳定）
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .iter()
            .map(|(name, tool)| ToolSpec {
                name: name.clone(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 关闭所有 toolkit；第二次调用直接返回 Ok
    pub async fn close_all(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let results = join_all(self.toolkits.iter().map(|tk| async move {
            let outcome = tk.close().await;
            (tk.name().to_string(), outcome)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, outcome)| match outcome {
                Ok(()) => {
                    tracing::info!(toolkit = %name, "Toolkit closed");
                    None
                }
                Err(e) => {
                    tracing::warn!(toolkit = %name, error = %e, "Toolkit close failed");
                    Some(format!("{}: {}", name, e))
                }
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Teardown(failures.join("; ")))
        }
    }
}

impl Drop for ToolRegistry {
    fn drop(&mut self) {
        if self.toolkits.is_empty() || self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let toolkits = std::mem::take(&mut self.toolkits);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("ToolRegistry dropped without teardown, closing toolkits in background");
                handle.spawn(async move {
                    for tk in toolkits {
                        if let Err(e) = tk.close().await {
                            tracing::warn!(toolkit = tk.name(), error = %e, "Toolkit close failed");
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!("ToolRegistry dropped outside a tokio runtime, toolkits not closed");
            }
        }
    }
}
