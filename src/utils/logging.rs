//! 日志工具模块
//!
//! 初始化 tracing 订阅器，并提供启动 / 退出时的横幅输出

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::StopReport;

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时默认 `info`，`verbose = true` 时为 `debug`。
/// 重复调用（例如多个测试）不会 panic。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 수강신청 자동화");
    info!(
        "⏱️ 启动时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
    );
    info!("🌐 目标站点: {}", config.target_url);
    match config.browser_debug_port {
        Some(port) => info!("🔌 浏览器: 连接调试端口 {}", port),
        None => info!("🔌 浏览器: 自行启动 (headless = {})", config.headless),
    }
    info!("💾 设置文件: {}", config.store_path);
    info!("{}", "=".repeat(60));
}

/// 记录程序退出信息
pub fn log_shutdown(report: &StopReport) {
    info!("\n{}", "=".repeat(60));
    info!("👋 程序退出");
    if report.was_running {
        info!("📊 宏循环共执行 {} 轮", report.attempts);
    }
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}
