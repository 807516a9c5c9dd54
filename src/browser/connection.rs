//! 连接到已开启远程调试端口的浏览器

use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到浏览器并获取页面
///
/// 优先复用已经打开目标站点的标签页（通常已经登录），找不到时新建页面并导航
pub async fn connect_to_browser_and_page(port: u16, target_url: &str) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("🔌 正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;

    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器同步已有的 target 列表
    sleep(tokio::time::Duration::from_millis(300)).await;

    let site = site_prefix(target_url);
    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面，查找 {} 下的标签页", pages.len(), site);

    for page in pages {
        if let Ok(Some(url)) = page.url().await {
            if url.starts_with(site) {
                info!("✓ 复用已打开的页面: {}", url);
                return Ok((browser, page));
            }
        }
    }

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    page.goto(target_url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", target_url, e);
        e
    })?;
    info!("🌐 已导航到: {}", target_url);

    Ok((browser, page))
}

/// `https://host/path` → `https://host`
fn site_prefix(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_prefix() {
        assert_eq!(site_prefix("https://sugang.korea.ac.kr/core?x=1"), "https://sugang.korea.ac.kr");
        assert_eq!(site_prefix("https://sugang.korea.ac.kr"), "https://sugang.korea.ac.kr");
    }
}
