//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! Message 与 async_openai 的请求 / 响应类型互转；工具请求、工具结果与 json_schema 结构化输出都走类型化 builder。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionResponseMessage, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCall};

/// DeepSeek 的 OpenAI 兼容端点
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名与单次请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            usage: TokenUsage::new(),
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        response_format: Option<ResponseFormat>,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(to_openai_messages(messages)?);
        if !tools.is_empty() {
            args.tools(tools.iter().map(to_openai_tool).collect::<Result<Vec<_>, _>>()?);
        }
        if let Some(format) = response_format {
            args.response_format(format);
        }
        args.build()
    }

    /// 发送请求并返回首个 choice 的 message
    async fn send(&self, request: CreateChatCompletionRequest) -> Result<ChatCompletionResponseMessage, LlmError> {
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))
    }
}

/// 工具参数回传给 API 的文本；解析失败时保存的原始字符串原样送回
fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let message: ChatCompletionRequestMessage = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.content.clone())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(m.content.clone())
            .build()?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() || !m.has_tool_calls() {
                args.content(m.content.clone());
            }
            if m.has_tool_calls() {
                let calls: Vec<ChatCompletionMessageToolCalls> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: c.id.clone(),
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: arguments_text(&c.arguments),
                            },
                        })
                    })
                    .collect();
                args.tool_calls(calls);
            }
            args.build()?.into()
        }
        Role::Tool => {
            let call_id = m
                .tool_result
                .as_ref()
                .map(|r| r.call_id.clone())
                .unwrap_or_default();
            ChatCompletionRequestToolMessageArgs::default()
                .content(m.content.clone())
                .tool_call_id(call_id)
                .build()?
                .into()
        }
    };
    Ok(message)
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages.iter().map(to_openai_message).collect()
}

fn to_openai_tool(spec: &ToolSpec) -> Result<ChatCompletionTools, OpenAIError> {
    let function = FunctionObjectArgs::default()
        .name(spec.name.clone())
        .description(spec.description.clone())
        .parameters(spec.parameters.clone())
        .build()?;
    Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
}

fn json_schema_format(schema_name: &str, schema: Value) -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: None,
            name: schema_name.to_string(),
            schema: Some(schema),
            strict: None,
        },
    }
}

/// 响应 message -> Message；arguments 不是合法 JSON 时原样保留为字符串，交给工具校验
fn from_response_message(message: ChatCompletionResponseMessage) -> Message {
    let content = message.content.unwrap_or_default();
    let calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| match call {
            ChatCompletionMessageToolCalls::Function(c) => {
                let arguments = serde_json::from_str(&c.function.arguments)
                    .unwrap_or(Value::String(c.function.arguments));
                ToolCall::new(c.id, c.function.name, arguments)
            }
            ChatCompletionMessageToolCalls::Custom(c) => {
                ToolCall::new(c.id, c.custom_tool.name, Value::String(c.custom_tool.input))
            }
        })
        .collect();

    if calls.is_empty() {
        Message::assistant(content)
    } else {
        Message::tool_request(content, calls)
    }
}

fn request_error(e: OpenAIError) -> LlmError {
    LlmError::Request(format!("invalid request: {}", e))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        let request = self.build_request(messages, tools, None).map_err(request_error)?;
        let message = self.send(request).await?;
        Ok(from_response_message(message))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: Value,
    ) -> Result<Value, LlmError> {
        let request = self
            .build_request(messages, &[], Some(json_schema_format(schema_name, schema)))
            .map_err(request_error)?;
        let message = self.send(request).await?;
        let text = message
            .content
            .ok_or_else(|| LlmError::InvalidResponse("structured response has no content".to_string()))?;
        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OpenAiClient {
        OpenAiClient::new(None, "gpt-4o-mini", Some("sk-test"), 5)
    }

    fn response(v: Value) -> ChatCompletionResponseMessage {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_tool_request_roundtrip() {
        let call = ToolCall::new("call_1", "lookup", json!({"q": "rust"}));
        let wire = to_openai_message(&Message::tool_request("", vec![call.clone()])).unwrap();
        let ChatCompletionRequestMessage::Assistant(assistant) = wire else {
            panic!("expected assistant message");
        };
        assert!(assistant.content.is_none());
        let calls = assistant.tool_calls.unwrap();
        let ChatCompletionMessageToolCalls::Function(sent) = &calls[0] else {
            panic!("expected function call");
        };
        assert_eq!(sent.function.arguments, "{\"q\":\"rust\"}");

        let back = from_response_message(response(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{ "id": "call_1", "type": "function",
                "function": { "name": "lookup", "arguments": "{\"q\":\"rust\"}" } }]
        })));
        assert_eq!(back.tool_calls, vec![call]);
    }

    #[test]
    fn test_tool_result_carries_call_id() {
        let call = ToolCall::new("call_9", "lookup", json!({}));
        let wire = to_openai_message(&Message::tool_result(&call, "ok", false)).unwrap();
        let ChatCompletionRequestMessage::Tool(tool) = wire else {
            panic!("expected tool message");
        };
        assert_eq!(tool.tool_call_id, "call_9");
    }

    #[test]
    fn test_malformed_arguments_sent_back_verbatim() {
        let msg = from_response_message(response(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{ "id": "c", "type": "function",
                "function": { "name": "lookup", "arguments": "{not json" } }]
        })));
        assert_eq!(msg.tool_calls[0].arguments, json!("{not json"));

        let wire = serde_json::to_value(to_openai_message(&msg).unwrap()).unwrap();
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], json!("{not json"));
    }

    #[test]
    fn test_plain_reply() {
        let msg = from_response_message(response(json!({ "role": "assistant", "content": "Task done." })));
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.content, "Task done.");
    }

    #[test]
    fn test_structured_request_uses_json_schema() {
        let request = client()
            .build_request(
                &[Message::system("judge"), Message::user("answer")],
                &[],
                Some(json_schema_format("judgment", json!({"type": "object"}))),
            )
            .unwrap();
        assert!(request.tools.is_none());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "judgment");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_tools_are_typed_functions() {
        let spec = ToolSpec {
            name: "echo".to_string(),
            description: "Echo text".to_string(),
            parameters: json!({"type": "object"}),
        };
        let request = client().build_request(&[Message::user("hi")], &[spec], None).unwrap();
        let tools = request.tools.unwrap();
        let ChatCompletionTools::Function(tool) = &tools[0] else {
            panic!("expected function tool");
        };
        assert_eq!(tool.function.name, "echo");
        assert!(request.response_format.is_none());
    }
}
