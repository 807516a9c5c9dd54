//! 提交服务 - 业务能力层
//!
//! 只负责找到提交按钮并点击，不判断服务器端是否登录成功

use tracing::{debug, info};

use crate::infrastructure::{AutomationPort, DocumentRef};
use crate::models::AutomationTarget;
use crate::services::SelectorResolver;

pub struct SubmissionTrigger<'a> {
    resolver: &'a SelectorResolver,
}

impl<'a> SubmissionTrigger<'a> {
    pub fn new(resolver: &'a SelectorResolver) -> Self {
        Self { resolver }
    }

    /// 返回是否找到并激活了提交控件
    pub async fn submit<P: AutomationPort + ?Sized>(&self, port: &P, doc: &DocumentRef) -> bool {
        let Some(button) = self
            .resolver
            .find(port, doc, AutomationTarget::Submit)
            .await
        else {
            debug!("未找到提交按钮");
            return false;
        };

        match port.activate(button).await {
            Ok(()) => {
                info!("📤 已点击登录按钮");
                true
            }
            Err(e) => {
                debug!("点击提交按钮失败: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryElement, MemoryPort};

    #[tokio::test]
    async fn test_submit_clicks_login_button() {
        let port = MemoryPort::new();
        let button = port.add(&DocumentRef::Top, MemoryElement::button("로그인"));
        let resolver = SelectorResolver::new();

        assert!(SubmissionTrigger::new(&resolver).submit(&port, &DocumentRef::Top).await);
        assert_eq!(port.activations(button), 1);
    }

    #[tokio::test]
    async fn test_submit_without_control_returns_false() {
        let port = MemoryPort::new();
        port.add(&DocumentRef::Top, MemoryElement::new("div").text("로그인"));
        let resolver = SelectorResolver::new();

        assert!(!SubmissionTrigger::new(&resolver).submit(&port, &DocumentRef::Top).await);
    }
}
