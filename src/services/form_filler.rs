//! 表单填写服务 - 业务能力层
//!
//! 只负责"把值写进一个字段"，并派发事件让页面的响应式逻辑把它当作真实输入

use tracing::debug;

use crate::error::{AutomationError, AutomationResult};
use crate::infrastructure::{AutomationPort, DocumentRef, DomEvent, ElementHandle};
use crate::models::AutomationTarget;
use crate::services::SelectorResolver;

/// 表单填写服务
pub struct FormFiller<'a> {
    resolver: &'a SelectorResolver,
}

impl<'a> FormFiller<'a> {
    pub fn new(resolver: &'a SelectorResolver) -> Self {
        Self { resolver }
    }

    /// 填写某个角色对应的字段
    ///
    /// 清空 → 聚焦 → 写值 → 依次派发 input / change / keyup / blur。
    /// 内部错误全部吞掉，返回 `false`。
    pub async fn fill<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        role: AutomationTarget,
        value: &str,
    ) -> bool {
        match self.try_fill(port, doc, role, value).await {
            Ok(()) => true,
            Err(e) => {
                debug!("[{}] 填写失败: {}", role, e);
                false
            }
        }
    }

    /// 定位字段，返回句柄供调用方复查当前值
    pub async fn locate<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        role: AutomationTarget,
    ) -> Option<ElementHandle> {
        self.resolver.find(port, doc, role).await
    }

    async fn try_fill<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        role: AutomationTarget,
        value: &str,
    ) -> AutomationResult<()> {
        let element = self
            .locate(port, doc, role)
            .await
            .ok_or(AutomationError::Lookup { role })?;

        write_value(port, element, value).await
    }
}

/// 对已定位的元素执行完整的写值序列
async fn write_value<P: AutomationPort + ?Sized>(
    port: &P,
    element: ElementHandle,
    value: &str,
) -> AutomationResult<()> {
    port.set_value(element, "").await?;
    port.focus(element).await?;
    port.set_value(element, value).await?;
    for event in DomEvent::FILL_SEQUENCE {
        port.dispatch(element, event).await?;
    }
    Ok(())
}
