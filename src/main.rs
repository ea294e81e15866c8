//! Sidekick - Rust 任务助手
//!
//! 入口：初始化日志、构建运行时，并在 stdin 上跑一个按行交互的会话。
//! `/criterion <text>` 设置成功标准，`/reset` 开始新会话，`/quit` 退出。
//! 退出（正常、出错或收到信号）时统一释放工具资源。

use std::sync::Arc;

use anyhow::Context;
use sidekick::config::{load_config, AppConfig};
use sidekick::core::{
    run_with_graceful_shutdown, ShutdownCoordinator, ShutdownManager, SidekickCleanup,
};
use sidekick::tools::EchoTool;
use sidekick::{Sidekick, SidekickBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};

async fn run_repl(sidekick: Arc<Sidekick>, manager: Arc<ShutdownManager>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id = Sidekick::new_session_id();
    let mut criterion = String::new();

    println!("Sidekick ready (session {}). Type /criterion <text>, /reset or /quit.", session_id);
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            manager.shutdown(sidekick::core::ShutdownReason::UserInitiated);
            break;
        }
        if line == "/reset" {
            sidekick.reset(&session_id).await;
            session_id = Sidekick::new_session_id();
            criterion.clear();
            println!("New session {}", session_id);
            continue;
        }
        if let Some(rest) = line.strip_prefix("/criterion") {
            criterion = rest.trim().to_string();
            println!("Success criterion set: {}", criterion);
            continue;
        }

        match sidekick.run_turn(&session_id, line, &criterion).await {
            Ok(outcome) => {
                if let Some(answer) = &outcome.answer {
                    println!("Sidekick: {}", answer);
                }
                println!("{}", outcome.feedback);
            }
            Err(e) => eprintln!("Turn failed: {}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sidekick::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let shutdown_timeout_secs = cfg.app.shutdown_timeout_secs;
    let sidekick = Arc::new(
        SidekickBuilder::new(cfg)
            .with_tool(Arc::new(EchoTool))
            .build()
            .await
            .context("Failed to set up sidekick")?,
    );

    let manager = Arc::new(ShutdownManager::new());
    let mut coordinator = ShutdownCoordinator::new().with_timeout(shutdown_timeout_secs);
    coordinator.register(SidekickCleanup::new(sidekick.clone()));

    run_with_graceful_shutdown(
        manager.clone(),
        run_repl(sidekick, manager),
        coordinator,
    )
    .await
}
