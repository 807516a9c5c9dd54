//! 自动化端口 - 基础设施层
//!
//! 核心逻辑只通过这个 trait 描述"意图"（查元素、填值、派发事件、点击），
//! 具体如何在页面里执行由适配器决定：
//! - `ChromiumPort`：真实浏览器（CDP）
//! - `MemoryPort`：内存 DOM，仅在测试或 `testing` feature 下编译

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AutomationResult;
use crate::models::Predicate;

/// 要搜索的文档：顶层文档或一层嵌套 frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentRef {
    Top,
    Frame(String),
}

impl DocumentRef {
    /// 传给页面脚本的 frame 标识，顶层为 None
    pub fn frame_id(&self) -> Option<&str> {
        match self {
            DocumentRef::Top => None,
            DocumentRef::Frame(id) => Some(id),
        }
    }
}

impl Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentRef::Top => write!(f, "top"),
            DocumentRef::Frame(id) => write!(f, "frame#{}", id),
        }
    }
}

/// 适配器内部的元素句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// 填值后派发的通知事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
    Input,
    Change,
    Keyup,
    Blur,
}

impl DomEvent {
    /// 固定的派发顺序
    pub const FILL_SEQUENCE: [DomEvent; 4] =
        [DomEvent::Input, DomEvent::Change, DomEvent::Keyup, DomEvent::Blur];

    pub fn as_str(self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::Keyup => "keyup",
            DomEvent::Blur => "blur",
        }
    }
}

/// 页面能力端口
///
/// 所有方法都只做一件事，不包含任何重试或流程逻辑。
#[async_trait]
pub trait AutomationPort: Send + Sync + 'static {
    /// 宿主窗口是否仍然存在
    async fn is_alive(&self) -> bool;

    /// 尝试进入一层嵌套 frame
    ///
    /// 不存在返回 `Ok(None)`，跨域拒绝返回 `AutomationError::Access`
    async fn frame_document(&self, frame_id: &str) -> AutomationResult<Option<DocumentRef>>;

    /// 按文档顺序返回满足谓词的元素，`scope` 限定子树
    async fn query(
        &self,
        doc: &DocumentRef,
        scope: Option<ElementHandle>,
        predicate: &Predicate,
    ) -> AutomationResult<Vec<ElementHandle>>;

    /// 元素是否参与布局
    async fn is_visible(&self, element: ElementHandle) -> AutomationResult<bool>;

    async fn value(&self, element: ElementHandle) -> AutomationResult<String>;

    async fn set_value(&self, element: ElementHandle, value: &str) -> AutomationResult<()>;

    async fn focus(&self, element: ElementHandle) -> AutomationResult<()>;

    async fn dispatch(&self, element: ElementHandle, event: DomEvent) -> AutomationResult<()>;

    /// 激活（点击）元素
    async fn activate(&self, element: ElementHandle) -> AutomationResult<()>;

    /// 元素的可见文本（已去首尾空白）
    async fn text(&self, element: ElementHandle) -> AutomationResult<String>;

    /// 订阅文档变更通知，连续变更会被合并
    async fn watch_mutations(&self, doc: &DocumentRef) -> AutomationResult<mpsc::Receiver<()>>;

    /// 停止对文档的变更观察
    async fn unwatch_mutations(&self, doc: &DocumentRef) -> AutomationResult<()>;

    async fn current_url(&self) -> AutomationResult<String>;

    async fn navigate(&self, url: &str) -> AutomationResult<()>;

    /// 删除文档中所有元素上的指定属性，返回删除数量
    async fn strip_attribute(&self, doc: &DocumentRef, attr: &str) -> AutomationResult<usize>;

    /// 读取文档所属窗口上的数值型全局变量
    async fn global_number(&self, doc: &DocumentRef, name: &str) -> AutomationResult<Option<f64>>;

    /// 覆盖数值型全局变量，变量不存在时不创建，返回是否写入
    async fn set_global_number(
        &self,
        doc: &DocumentRef,
        name: &str,
        value: f64,
    ) -> AutomationResult<bool>;
}
