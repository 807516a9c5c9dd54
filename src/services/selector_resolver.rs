//! 元素选择服务 - 业务能力层
//!
//! 按角色的有序谓词列表查找第一个可见元素。
//! 列表顺序决定优先级：靠前的谓词永远压过靠后的，与元素在文档中的位置无关。

use std::collections::HashMap;
use tracing::debug;

use crate::infrastructure::{AutomationPort, DocumentRef, ElementHandle};
use crate::models::{AutomationTarget, Predicate};

/// 元素选择服务
#[derive(Default)]
pub struct SelectorResolver {
    overrides: HashMap<AutomationTarget, Vec<Predicate>>,
}

impl SelectorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换某个角色的候选列表
    pub fn with_candidates(mut self, role: AutomationTarget, candidates: Vec<Predicate>) -> Self {
        self.overrides.insert(role, candidates);
        self
    }

    fn candidates(&self, role: AutomationTarget) -> Vec<Predicate> {
        self.overrides
            .get(&role)
            .cloned()
            .unwrap_or_else(|| role.candidates())
    }

    /// 在整个文档中查找
    pub async fn find<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        role: AutomationTarget,
    ) -> Option<ElementHandle> {
        self.find_in(port, doc, None, role).await
    }

    /// 在 `scope` 子树中查找（`None` 表示整个文档）
    pub async fn find_in<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        scope: Option<ElementHandle>,
        role: AutomationTarget,
    ) -> Option<ElementHandle> {
        for predicate in self.candidates(role) {
            if let Some(element) = self.first_visible(port, doc, scope, &predicate).await {
                debug!("[{}] 命中候选 {:?}", role, predicate);
                return Some(element);
            }
        }

        for predicate in role.fallback() {
            if let Some(element) = self.first_visible(port, doc, scope, &predicate).await {
                debug!("[{}] 使用兜底规则 {:?}", role, predicate);
                return Some(element);
            }
        }

        debug!("[{}] 在 {} 中未找到可见元素", role, doc);
        None
    }

    /// 单个谓词下第一个可见元素，端口错误视为未命中
    async fn first_visible<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        scope: Option<ElementHandle>,
        predicate: &Predicate,
    ) -> Option<ElementHandle> {
        let candidates = match port.query(doc, scope, predicate).await {
            Ok(found) => found,
            Err(e) => {
                debug!("查询 {:?} 失败: {}", predicate, e);
                return None;
            }
        };

        for element in candidates {
            if port.is_visible(element).await.unwrap_or(false) {
                return Some(element);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryElement, MemoryPort};

    #[tokio::test]
    async fn test_earlier_predicate_wins_over_document_order() {
        let port = MemoryPort::new();
        // name="id" 在文档中更靠前，但 id="id" 在候选列表里更靠前
        let by_name = port.add(&DocumentRef::Top, MemoryElement::new("input").attr("name", "id"));
        let by_id = port.add(&DocumentRef::Top, MemoryElement::input("id"));

        let found = SelectorResolver::new()
            .find(&port, &DocumentRef::Top, AutomationTarget::Username)
            .await;
        assert_eq!(found, Some(by_id));
        assert_ne!(found, Some(by_name));
    }

    #[tokio::test]
    async fn test_custom_list_priority() {
        let port = MemoryPort::new();
        let first_in_doc = port.add(&DocumentRef::Top, MemoryElement::new("a").attr("data-x", "1"));
        let second_in_doc = port.add(&DocumentRef::Top, MemoryElement::new("a").attr("data-y", "1"));

        let resolver = SelectorResolver::new().with_candidates(
            AutomationTarget::Search,
            vec![
                Predicate::attr_equals("data-y", "1"),
                Predicate::attr_equals("data-x", "1"),
            ],
        );
        let found = resolver
            .find(&port, &DocumentRef::Top, AutomationTarget::Search)
            .await;
        assert_eq!(found, Some(second_in_doc));
        assert_ne!(found, Some(first_in_doc));
    }

    #[tokio::test]
    async fn test_invisible_match_is_skipped() {
        let port = MemoryPort::new();
        port.add(&DocumentRef::Top, MemoryElement::input("pwd").hidden());
        let visible = port.add(
            &DocumentRef::Top,
            MemoryElement::new("input").attr("name", "pwd"),
        );

        let found = SelectorResolver::new()
            .find(&port, &DocumentRef::Top, AutomationTarget::Password)
            .await;
        assert_eq!(found, Some(visible));
    }

    #[tokio::test]
    async fn test_fallback_heuristics() {
        let port = MemoryPort::new();
        port.add(&DocumentRef::Top, MemoryElement::new("input").attr("type", "hidden"));
        let text = port.add(&DocumentRef::Top, MemoryElement::new("input").attr("name", "login"));
        let password = port.add(
            &DocumentRef::Top,
            MemoryElement::new("input").attr("type", "password"),
        );

        let resolver = SelectorResolver::new();
        assert_eq!(
            resolver.find(&port, &DocumentRef::Top, AutomationTarget::Username).await,
            Some(text)
        );
        assert_eq!(
            resolver.find(&port, &DocumentRef::Top, AutomationTarget::Password).await,
            Some(password)
        );
        assert_eq!(
            resolver.find(&port, &DocumentRef::Top, AutomationTarget::Register).await,
            None
        );
    }

    #[tokio::test]
    async fn test_scoped_lookup_stays_inside_row() {
        let port = MemoryPort::new();
        let row_a = port.add(&DocumentRef::Top, MemoryElement::new("tr"));
        let apply_a = port.add_child(row_a, MemoryElement::button("신청"));
        let row_b = port.add(&DocumentRef::Top, MemoryElement::new("tr"));
        let apply_b = port.add_child(row_b, MemoryElement::button("신청"));

        let resolver = SelectorResolver::new();
        assert_eq!(
            resolver
                .find_in(&port, &DocumentRef::Top, Some(row_b), AutomationTarget::Register)
                .await,
            Some(apply_b)
        );
        assert_eq!(
            resolver
                .find_in(&port, &DocumentRef::Top, Some(row_a), AutomationTarget::Register)
                .await,
            Some(apply_a)
        );
    }

    #[tokio::test]
    async fn test_denied_frame_yields_none() {
        let port = MemoryPort::new();
        let frame = port.add_frame("Main", false);
        let found = SelectorResolver::new()
            .find(&port, &frame, AutomationTarget::Username)
            .await;
        assert_eq!(found, None);
    }
}
