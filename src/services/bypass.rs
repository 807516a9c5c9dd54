//! 反自动化绕过服务 - 业务能力层
//!
//! 尽力而为：去掉页面上的检测标记属性、清零计数器、缩短过长的网络超时。
//! 没有失败模式，也不保证任何效果。

use tracing::debug;

use crate::infrastructure::{AutomationPort, DocumentRef};

/// 绕过规则
#[derive(Debug, Clone)]
pub struct BypassRules {
    /// 需要删除的标记属性
    pub marker_attributes: Vec<String>,
    /// 需要清零的全局计数器
    pub counters: Vec<String>,
    /// 需要限制上限的全局超时变量（毫秒）
    pub timeouts: Vec<String>,
    pub timeout_cap_ms: f64,
}

impl Default for BypassRules {
    fn default() -> Self {
        Self {
            marker_attributes: vec!["data-macro-check".to_string(), "data-auto-detect".to_string()],
            counters: vec![
                "macroCount".to_string(),
                "clickCount".to_string(),
                "reqCount".to_string(),
            ],
            timeouts: vec!["ajaxTimeout".to_string(), "requestTimeout".to_string()],
            timeout_cap_ms: 3000.0,
        }
    }
}

/// 单次执行的统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BypassReport {
    pub attributes_removed: usize,
    pub counters_reset: usize,
    pub timeouts_capped: usize,
}

/// 绕过策略
#[derive(Default)]
pub struct BypassStrategy {
    rules: BypassRules,
}

impl BypassStrategy {
    pub fn new(rules: BypassRules) -> Self {
        Self { rules }
    }

    /// 执行一次绕过，所有端口错误只记录 debug 日志
    pub async fn apply<P: AutomationPort + ?Sized>(&self, port: &P, doc: &DocumentRef) -> BypassReport {
        let mut report = BypassReport::default();

        for attr in &self.rules.marker_attributes {
            match port.strip_attribute(doc, attr).await {
                Ok(removed) => report.attributes_removed += removed,
                Err(e) => debug!("删除属性 {} 失败: {}", attr, e),
            }
        }

        for counter in &self.rules.counters {
            match port.global_number(doc, counter).await {
                Ok(Some(current)) if current != 0.0 => {
                    if let Ok(true) = port.set_global_number(doc, counter, 0.0).await {
                        report.counters_reset += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("读取计数器 {} 失败: {}", counter, e),
            }
        }

        for timeout in &self.rules.timeouts {
            match port.global_number(doc, timeout).await {
                Ok(Some(current)) if current > self.rules.timeout_cap_ms => {
                    if let Ok(true) = port
                        .set_global_number(doc, timeout, self.rules.timeout_cap_ms)
                        .await
                    {
                        report.timeouts_capped += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("读取超时 {} 失败: {}", timeout, e),
            }
        }

        if report != BypassReport::default() {
            debug!("绕过结果: {:?}", report);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryElement, MemoryPort};

    #[tokio::test]
    async fn test_apply_strips_resets_and_caps() {
        let port = MemoryPort::new();
        let doc = DocumentRef::Top;
        let guarded = port.add(&doc, MemoryElement::button("신청").attr("data-macro-check", "1"));
        port.set_global(&doc, "macroCount", 42.0);
        port.set_global(&doc, "clickCount", 0.0);
        port.set_global(&doc, "ajaxTimeout", 30_000.0);
        port.set_global(&doc, "requestTimeout", 1_000.0);

        let report = BypassStrategy::default().apply(&port, &doc).await;

        assert_eq!(port.attr_of(guarded, "data-macro-check"), None);
        assert_eq!(port.global(&doc, "macroCount"), Some(0.0));
        assert_eq!(port.global(&doc, "ajaxTimeout"), Some(3000.0));
        assert_eq!(port.global(&doc, "requestTimeout"), Some(1000.0));
        assert_eq!(
            report,
            BypassReport {
                attributes_removed: 1,
                counters_reset: 1,
                timeouts_capped: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_apply_never_fails_on_denied_frame() {
        let port = MemoryPort::new();
        let frame = port.add_frame("Main", false);
        let report = BypassStrategy::default().apply(&port, &frame).await;
        assert_eq!(report, BypassReport::default());
    }
}
