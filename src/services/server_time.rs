//! 服务器时间服务 - 业务能力层
//!
//! 读取目标站点响应头里的 `Date`，计算本机时钟与服务器的偏差。
//! 只用于日志提示，调度始终使用本机时钟。

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use reqwest::header::DATE;
use tracing::debug;

/// 服务器时间读数
#[derive(Debug, Clone)]
pub struct ServerClock {
    pub server_time: DateTime<Utc>,
    /// 服务器时间 - 本机时间
    pub offset: Duration,
}

impl ServerClock {
    pub fn server_local(&self) -> DateTime<Local> {
        self.server_time.with_timezone(&Local)
    }
}

/// 请求一次目标站点并解析 `Date` 头
pub async fn fetch_server_clock(url: &str) -> Result<ServerClock> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .context("无法创建 HTTP 客户端")?;

    let sent_at = Utc::now();
    let response = client
        .head(url)
        .send()
        .await
        .with_context(|| format!("请求 {} 失败", url))?;
    let received_at = Utc::now();

    let header = response
        .headers()
        .get(DATE)
        .context("响应中没有 Date 头")?
        .to_str()
        .context("Date 头不是合法字符串")?;
    debug!("服务器 Date 头: {}", header);

    let server_time = parse_http_date(header)?;
    // 取往返中点作为本机参考时间
    let local_mid = sent_at + (received_at - sent_at) / 2;

    Ok(ServerClock {
        server_time,
        offset: server_time - local_mid,
    })
}

/// 解析 RFC 2822 / IMF-fixdate 格式的 HTTP 日期
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc2822(value.trim())
        .with_context(|| format!("无法解析 Date 头: {}", value))?;
    Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Tue, 15 Oct 2024 09:59:58 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 10, 15, 9, 59, 58).unwrap());
    }

    #[test]
    fn test_parse_http_date_rejects_garbage() {
        assert!(parse_http_date("yesterday").is_err());
    }
}
