//! 工具层：注册表、toolkit 生命周期、调度执行器

pub mod echo;
pub mod executor;
pub mod registry;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry, Toolkit};
