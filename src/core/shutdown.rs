//! 优雅关闭处理
//!
//! 监听 Ctrl+C / SIGTERM，应用主体结束（正常或出错）或收到信号后，统一执行清理任务，
//! 保证工具注册表持有的外部资源（浏览器句柄等）在进程退出前释放。

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::Sidekick;

/// 关闭原因
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C 或 quit 命令)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
}

/// 关闭信号管理器
#[derive(Clone, Default)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发关闭
    pub fn shutdown(&self, reason: ShutdownReason) {
        tracing::info!(?reason, "Shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 释放 Sidekick 工具注册表的清理任务
pub struct SidekickCleanup {
    sidekick: Arc<Sidekick>,
}

impl SidekickCleanup {
    pub fn new(sidekick: Arc<Sidekick>) -> Self {
        Self { sidekick }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for SidekickCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.sidekick.teardown().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ToolRegistry"
    }
}

/// 关闭协调器：按注册顺序执行清理任务，每个任务有超时
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_tasks: Vec::new(),
            timeout_secs: 5,
        }
    }

    /// 设置单个清理任务的超时（秒），至少 1 秒
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!("Cleanup task '{}' completed", name),
                Ok(Err(e)) => tracing::warn!("Cleanup task '{}' failed: {}", name, e),
                Err(_) => tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs),
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行应用直到其结束或收到关闭信号；无论哪种情况（包括应用返回错误）都会执行清理
pub async fn run_with_graceful_shutdown<F>(
    manager: Arc<ShutdownManager>,
    app: F,
    coordinator: ShutdownCoordinator,
) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    manager.install_signal_handlers();

    let result = tokio::select! {
        r = app => {
            tracing::info!("Application finished");
            r
        }
        _ = manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    coordinator.run_cleanup().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockCleanup {
        called: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for MockCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.called.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "MockCleanup"
        }
    }

    struct StuckCleanup;

    #[async_trait::async_trait]
    impl ShutdownCleanup for StuckCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "StuckCleanup"
        }
    }

    #[tokio::test]
    async fn test_shutdown_manager_signals_waiters() {
        let manager = Arc::new(ShutdownManager::new());
        assert!(!manager.is_shutdown());
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for_shutdown().await })
        };
        manager.shutdown(ShutdownReason::UserInitiated);
        waiter.await.unwrap();
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_stuck_cleanup_does_not_block_later_tasks() {
        let called = Arc::new(AtomicBool::new(false));
        let mut coordinator = ShutdownCoordinator::new().with_timeout(1);
        coordinator.register(StuckCleanup);
        coordinator.register(MockCleanup {
            called: called.clone(),
        });

        let started = std::time::Instant::now();
        coordinator.run_cleanup().await;
        assert!(called.load(Ordering::SeqCst));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cleanup_runs_even_when_app_fails() {
        let called = Arc::new(AtomicBool::new(false));
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register(MockCleanup {
            called: called.clone(),
        });

        let manager = Arc::new(ShutdownManager::new());
        let result = run_with_graceful_shutdown(
            manager,
            async { Err(anyhow::anyhow!("turn blew up")) },
            coordinator,
        )
        .await;

        assert!(result.is_err());
        assert!(called.load(Ordering::SeqCst));
    }
}
