//! 内存 DOM 端口 - 基础设施层
//!
//! 一棵极简的内存文档树，实现与 `ChromiumPort` 相同的端口能力。
//! 用于测试；文档顺序即插入顺序。

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{AutomationError, AutomationResult};
use crate::infrastructure::port::{AutomationPort, DocumentRef, DomEvent, ElementHandle};
use crate::models::Predicate;

/// 元素被激活时执行的回调，在释放内部锁之后调用
pub type Reaction = Arc<dyn Fn(&MemoryPort) + Send + Sync>;

/// 内存元素的描述
#[derive(Debug, Clone)]
pub struct MemoryElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub value: String,
    pub visible: bool,
}

impl MemoryElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            value: String::new(),
            visible: true,
        }
    }

    /// `<input id=...>`
    pub fn input(id: &str) -> Self {
        Self::new("input").attr("id", id)
    }

    pub fn button(text: &str) -> Self {
        Self::new("button").text(text)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// 与浏览器一致：input 缺省为 text，button 缺省为 submit
    fn effective_type(&self) -> String {
        match self.attrs.get("type") {
            Some(t) => t.trim().to_lowercase(),
            None if self.tag == "input" => "text".to_string(),
            None if self.tag == "button" => "submit".to_string(),
            None => String::new(),
        }
    }

    fn is_interactive(&self) -> bool {
        match self.tag.as_str() {
            "button" | "a" => true,
            "input" => matches!(self.effective_type().as_str(), "submit" | "button"),
            _ => self.attrs.get("role").map(String::as_str) == Some("button"),
        }
    }

    fn display_text(&self) -> &str {
        if self.text.is_empty() {
            &self.value
        } else {
            &self.text
        }
    }

    fn matches(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::AttrEquals { attr, value } => self.attrs.get(attr) == Some(value),
            Predicate::AttrContains { attr, needle } => self
                .attrs
                .get(attr)
                .map(|v| v.contains(needle.as_str()))
                .unwrap_or(false),
            Predicate::TagType { tag, input_type } => {
                self.tag == tag.to_lowercase()
                    && input_type
                        .as_ref()
                        .map(|t| self.effective_type() == t.trim().to_lowercase())
                        .unwrap_or(true)
            }
            Predicate::Text { text } => {
                self.is_interactive()
                    && self.display_text().trim().to_lowercase() == text.trim().to_lowercase()
            }
        }
    }
}

#[derive(Debug)]
struct Node {
    doc: DocumentRef,
    parent: Option<usize>,
    element: MemoryElement,
    events: Vec<DomEvent>,
    focus_count: usize,
    activations: usize,
}

#[derive(Default)]
struct MemoryState {
    nodes: Vec<Node>,
    /// frame 标识 -> 是否允许访问
    frames: HashMap<String, bool>,
    globals: HashMap<(DocumentRef, String), f64>,
    url: String,
    closed: bool,
    navigations: Vec<String>,
    watchers: HashMap<DocumentRef, mpsc::Sender<()>>,
    reactions: HashMap<usize, Reaction>,
    /// `text()` 的模拟耗时
    read_delay: Option<Duration>,
    reads_in_flight: usize,
    max_reads_in_flight: usize,
}

impl MemoryState {
    fn node(&self, element: ElementHandle) -> AutomationResult<&Node> {
        self.nodes
            .get(element.0 as usize)
            .ok_or_else(|| AutomationError::Script("stale-element".to_string()))
    }

    fn node_mut(&mut self, element: ElementHandle) -> AutomationResult<&mut Node> {
        self.nodes
            .get_mut(element.0 as usize)
            .ok_or_else(|| AutomationError::Script("stale-element".to_string()))
    }

    fn is_descendant(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.nodes[index].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    fn notify(&mut self, doc: &DocumentRef) {
        if let Some(tx) = self.watchers.get(doc) {
            if tx.is_closed() {
                self.watchers.remove(doc);
            } else {
                let _ = tx.try_send(());
            }
        }
    }
}

/// 进行中的 `text()` 调用；被取消时也会减计数
struct ReadInFlight<'a>(&'a MemoryPort);

impl Drop for ReadInFlight<'_> {
    fn drop(&mut self) {
        self.0.state().reads_in_flight -= 1;
    }
}

/// 内存端口
#[derive(Default)]
pub struct MemoryPort {
    state: Mutex<MemoryState>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: &str) -> Self {
        let port = Self::default();
        port.state().url = url.to_string();
        port
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== 构造文档 ==========

    /// 在文档末尾添加元素
    pub fn add(&self, doc: &DocumentRef, element: MemoryElement) -> ElementHandle {
        self.insert(doc.clone(), None, element)
    }

    /// 作为 `parent` 的子元素添加
    pub fn add_child(&self, parent: ElementHandle, element: MemoryElement) -> ElementHandle {
        let doc = {
            let state = self.state();
            match state.node(parent) {
                Ok(node) => node.doc.clone(),
                Err(_) => DocumentRef::Top,
            }
        };
        self.insert(doc, Some(parent.0 as usize), element)
    }

    fn insert(
        &self,
        doc: DocumentRef,
        parent: Option<usize>,
        element: MemoryElement,
    ) -> ElementHandle {
        let mut state = self.state();
        state.nodes.push(Node {
            doc: doc.clone(),
            parent,
            element,
            events: Vec::new(),
            focus_count: 0,
            activations: 0,
        });
        let handle = ElementHandle((state.nodes.len() - 1) as u64);
        state.notify(&doc);
        handle
    }

    /// 声明一个嵌套 frame；`accessible = false` 模拟跨域拒绝
    pub fn add_frame(&self, frame_id: &str, accessible: bool) -> DocumentRef {
        self.state()
            .frames
            .insert(frame_id.to_string(), accessible);
        DocumentRef::Frame(frame_id.to_string())
    }

    pub fn set_visible(&self, element: ElementHandle, visible: bool) {
        let mut state = self.state();
        if let Ok(node) = state.node_mut(element) {
            node.element.visible = visible;
            let doc = node.doc.clone();
            state.notify(&doc);
        }
    }

    pub fn set_attr(&self, element: ElementHandle, name: &str, value: &str) {
        let mut state = self.state();
        if let Ok(node) = state.node_mut(element) {
            node.element
                .attrs
                .insert(name.to_string(), value.to_string());
            let doc = node.doc.clone();
            state.notify(&doc);
        }
    }

    pub fn set_text(&self, element: ElementHandle, text: &str) {
        let mut state = self.state();
        if let Ok(node) = state.node_mut(element) {
            node.element.text = text.to_string();
            let doc = node.doc.clone();
            state.notify(&doc);
        }
    }

    pub fn set_global(&self, doc: &DocumentRef, name: &str, value: f64) {
        self.state()
            .globals
            .insert((doc.clone(), name.to_string()), value);
    }

    /// 激活元素时触发的回调
    pub fn on_activate(&self, element: ElementHandle, reaction: Reaction) {
        self.state().reactions.insert(element.0 as usize, reaction);
    }

    /// 模拟宿主窗口被关闭
    pub fn close(&self) {
        self.state().closed = true;
    }

    // ========== 观察结果 ==========

    pub fn value_of(&self, element: ElementHandle) -> String {
        self.state()
            .node(element)
            .map(|n| n.element.value.clone())
            .unwrap_or_default()
    }

    pub fn attr_of(&self, element: ElementHandle, name: &str) -> Option<String> {
        self.state()
            .node(element)
            .ok()
            .and_then(|n| n.element.attrs.get(name).cloned())
    }

    pub fn events_of(&self, element: ElementHandle) -> Vec<DomEvent> {
        self.state()
            .node(element)
            .map(|n| n.events.clone())
            .unwrap_or_default()
    }

    pub fn event_count(&self, element: ElementHandle, event: DomEvent) -> usize {
        self.events_of(element)
            .into_iter()
            .filter(|e| *e == event)
            .count()
    }

    pub fn focus_count(&self, element: ElementHandle) -> usize {
        self.state()
            .node(element)
            .map(|n| n.focus_count)
            .unwrap_or_default()
    }

    pub fn activations(&self, element: ElementHandle) -> usize {
        self.state()
            .node(element)
            .map(|n| n.activations)
            .unwrap_or_default()
    }

    pub fn global(&self, doc: &DocumentRef, name: &str) -> Option<f64> {
        self.state()
            .globals
            .get(&(doc.clone(), name.to_string()))
            .copied()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    /// 之后每次 `text()` 都会在返回前等待 `delay`，模拟慢页面
    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = Some(delay);
    }

    /// 同时进行中的 `text()` 调用数的历史最大值
    pub fn max_concurrent_reads(&self) -> usize {
        self.state().max_reads_in_flight
    }

    pub fn is_watching(&self, doc: &DocumentRef) -> bool {
        self.state()
            .watchers
            .get(doc)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn check_frame(state: &MemoryState, doc: &DocumentRef) -> AutomationResult<()> {
        match doc {
            DocumentRef::Top => Ok(()),
            DocumentRef::Frame(id) => match state.frames.get(id) {
                Some(true) => Ok(()),
                Some(false) => Err(AutomationError::Access { frame: id.clone() }),
                None => Err(AutomationError::Script(format!("frame 不存在: {}", id))),
            },
        }
    }
}

#[async_trait]
impl AutomationPort for MemoryPort {
    async fn is_alive(&self) -> bool {
        !self.state().closed
    }

    async fn frame_document(&self, frame_id: &str) -> AutomationResult<Option<DocumentRef>> {
        match self.state().frames.get(frame_id) {
            Some(true) => Ok(Some(DocumentRef::Frame(frame_id.to_string()))),
            Some(false) => Err(AutomationError::Access {
                frame: frame_id.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        doc: &DocumentRef,
        scope: Option<ElementHandle>,
        predicate: &Predicate,
    ) -> AutomationResult<Vec<ElementHandle>> {
        let state = self.state();
        Self::check_frame(&state, doc)?;
        if let Some(scope) = scope {
            state.node(scope)?;
        }

        Ok(state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| &node.doc == doc)
            .filter(|(index, _)| {
                scope
                    .map(|s| state.is_descendant(*index, s.0 as usize))
                    .unwrap_or(true)
            })
            .filter(|(_, node)| node.element.matches(predicate))
            .map(|(index, _)| ElementHandle(index as u64))
            .collect())
    }

    async fn is_visible(&self, element: ElementHandle) -> AutomationResult<bool> {
        let state = self.state();
        let mut node = state.node(element)?;
        loop {
            if !node.element.visible {
                return Ok(false);
            }
            match node.parent {
                Some(parent) => node = &state.nodes[parent],
                None => return Ok(true),
            }
        }
    }

    async fn value(&self, element: ElementHandle) -> AutomationResult<String> {
        Ok(self.state().node(element)?.element.value.clone())
    }

    async fn set_value(&self, element: ElementHandle, value: &str) -> AutomationResult<()> {
        self.state().node_mut(element)?.element.value = value.to_string();
        Ok(())
    }

    async fn focus(&self, element: ElementHandle) -> AutomationResult<()> {
        self.state().node_mut(element)?.focus_count += 1;
        Ok(())
    }

    async fn dispatch(&self, element: ElementHandle, event: DomEvent) -> AutomationResult<()> {
        self.state().node_mut(element)?.events.push(event);
        Ok(())
    }

    async fn activate(&self, element: ElementHandle) -> AutomationResult<()> {
        let reaction = {
            let mut state = self.state();
            state.node_mut(element)?.activations += 1;
            state.reactions.get(&(element.0 as usize)).cloned()
        };
        if let Some(reaction) = reaction {
            reaction(self);
        }
        Ok(())
    }

    async fn text(&self, element: ElementHandle) -> AutomationResult<String> {
        let (text, delay) = {
            let mut state = self.state();
            let root = element.0 as usize;
            state.node(element)?;

            // 元素自身文本 + 所有后代文本
            let text = state
                .nodes
                .iter()
                .enumerate()
                .filter(|(index, _)| *index == root || state.is_descendant(*index, root))
                .map(|(_, node)| node.element.display_text().trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            state.reads_in_flight += 1;
            state.max_reads_in_flight = state.max_reads_in_flight.max(state.reads_in_flight);
            (text, state.read_delay)
        };

        let _read = ReadInFlight(self);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(text)
    }

    async fn watch_mutations(&self, doc: &DocumentRef) -> AutomationResult<mpsc::Receiver<()>> {
        let mut state = self.state();
        Self::check_frame(&state, doc)?;
        let (tx, rx) = mpsc::channel(1);
        state.watchers.insert(doc.clone(), tx);
        Ok(rx)
    }

    async fn unwatch_mutations(&self, doc: &DocumentRef) -> AutomationResult<()> {
        self.state().watchers.remove(doc);
        Ok(())
    }

    async fn current_url(&self) -> AutomationResult<String> {
        Ok(self.state().url.clone())
    }

    async fn navigate(&self, url: &str) -> AutomationResult<()> {
        let mut state = self.state();
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn strip_attribute(&self, doc: &DocumentRef, attr: &str) -> AutomationResult<usize> {
        let mut state = self.state();
        Self::check_frame(&state, doc)?;
        let mut removed = 0;
        for node in state.nodes.iter_mut().filter(|n| &n.doc == doc) {
            if node.element.attrs.remove(attr).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            state.notify(doc);
        }
        Ok(removed)
    }

    async fn global_number(&self, doc: &DocumentRef, name: &str) -> AutomationResult<Option<f64>> {
        let state = self.state();
        Self::check_frame(&state, doc)?;
        Ok(state.globals.get(&(doc.clone(), name.to_string())).copied())
    }

    async fn set_global_number(
        &self,
        doc: &DocumentRef,
        name: &str,
        value: f64,
    ) -> AutomationResult<bool> {
        let mut state = self.state();
        Self::check_frame(&state, doc)?;
        match state.globals.get_mut(&(doc.clone(), name.to_string())) {
            Some(slot) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hidden_parent_hides_children() {
        let port = MemoryPort::new();
        let form = port.add(&DocumentRef::Top, MemoryElement::new("form").hidden());
        let input = port.add_child(form, MemoryElement::input("id"));

        assert!(!port.is_visible(input).await.unwrap());
        port.set_visible(form, true);
        assert!(port.is_visible(input).await.unwrap());
    }

    #[tokio::test]
    async fn test_text_predicate_only_matches_interactive_elements() {
        let port = MemoryPort::new();
        let label = port.add(&DocumentRef::Top, MemoryElement::new("span").text("조회"));
        let button = port.add(&DocumentRef::Top, MemoryElement::button("  조회 "));

        let found = port
            .query(&DocumentRef::Top, None, &Predicate::text("조회"))
            .await
            .unwrap();
        assert_eq!(found, vec![button]);
        assert!(!found.contains(&label));
    }

    #[tokio::test]
    async fn test_input_type_defaults_to_text() {
        let port = MemoryPort::new();
        let plain = port.add(&DocumentRef::Top, MemoryElement::input("a"));
        port.add(
            &DocumentRef::Top,
            MemoryElement::input("b").attr("type", "password"),
        );

        let found = port
            .query(&DocumentRef::Top, None, &Predicate::tag_type("input", "text"))
            .await
            .unwrap();
        assert_eq!(found, vec![plain]);
    }

    #[tokio::test]
    async fn test_denied_frame_reports_access_error() {
        let port = MemoryPort::new();
        port.add_frame("Main", false);
        let result = port.frame_document("Main").await;
        assert!(matches!(result, Err(AutomationError::Access { .. })));
        assert!(port.frame_document("Other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_coalesced() {
        let port = MemoryPort::new();
        let mut rx = port.watch_mutations(&DocumentRef::Top).await.unwrap();
        port.add(&DocumentRef::Top, MemoryElement::new("div"));
        port.add(&DocumentRef::Top, MemoryElement::new("div"));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
