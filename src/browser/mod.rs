//! 浏览器获取：连接已运行的浏览器，或自行启动一个

pub mod connection;
pub mod headless;

pub use connection::connect_to_browser_and_page;
pub use headless::launch_browser;

use anyhow::Result;
use chromiumoxide::{Browser, Page};

use crate::config::Config;

/// 按配置获取浏览器和目标页面
pub async fn acquire(config: &Config) -> Result<(Browser, Page)> {
    match config.browser_debug_port {
        Some(port) => connect_to_browser_and_page(port, &config.target_url).await,
        None => launch_browser(&config.target_url, config.headless, config.chrome_executable.as_deref()).await,
    }
}
