//! 工具执行器（动作调度）
//!
//! 持有 ToolRegistry 与单次调用超时。dispatch 按请求顺序逐个执行 tool call，
//! 每个请求产出且只产出一条工具结果消息；未知工具、参数错误、执行失败、超时都写成错误结果而不是向上抛出。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::memory::{Message, ToolCall};
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将结果映射为工具结果消息
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行单个工具；超时返回 ToolTimeout，未知工具返回 HallucinatedTool，工具返回 Err 则为 ToolExecutionFailed
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(AgentError::HallucinatedTool(_))) => "unknown_tool",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 依次执行全部请求，结果顺序与请求一致
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let message = match self.execute(&call.name, call.arguments.clone()).await {
                Ok(content) => Message::tool_result(call, content, false),
                Err(e) => Message::tool_result(call, format!("Error: {}", e), true),
            };
            results.push(message);
        }
        results
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
