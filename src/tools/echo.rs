//! Echo 工具（演示与测试用）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::Tool;

/// Echo 工具：回显 text 参数；缺少 text 时返回参数错误
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string", "description": "Text to echo" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        args.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("invalid arguments for echo, expected {{\"text\": string}}, got {}", args))
    }
}
