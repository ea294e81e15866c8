//! Sidekick - Rust 任务助手
//!
//! 每一轮（superstep）在 执行 -> 工具调度 -> 执行 ... -> 评审 之间循环，
//! 直到回答满足调用方给出的成功标准，或评审认为需要用户补充输入。
//!
//! 模块划分：
//! - **agent**: 无头运行时（turn / reset / teardown）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、会话状态与存储、构建器、优雅关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息类型与 transcript 纯函数
//! - **react**: Actor、Judge、路由与单轮主循环
//! - **tools**: 工具注册表、toolkit 生命周期、调度执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{DisplayMessage, Sidekick};
pub use core::{AgentError, SidekickBuilder};
