//! 核心层：错误、会话状态与存储、构建器、优雅关闭

pub mod builder;
pub mod error;
pub mod session_store;
pub mod shutdown;
pub mod state;

pub use builder::{create_llm_from_config, SidekickBuilder};
pub use error::AgentError;
pub use session_store::{MemorySessionStore, SessionStore};
pub use shutdown::{
    run_with_graceful_shutdown, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason, SidekickCleanup,
};
pub use state::{LoopPhase, SessionState};
