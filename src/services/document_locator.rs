//! 文档定位服务 - 业务能力层
//!
//! 决定在哪个文档里找元素：固定顺序尝试一层嵌套 frame，失败时回退到顶层文档

use tracing::debug;

use crate::infrastructure::{AutomationPort, DocumentRef};

/// 依次尝试的 frame 标识
pub const FRAME_IDS: [&str; 3] = ["Main", "coreMain", "contentFrame"];

/// 文档定位服务
pub struct DocumentLocator {
    frame_ids: Vec<String>,
}

impl DocumentLocator {
    pub fn new() -> Self {
        Self::with_frames(FRAME_IDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_frames(frame_ids: Vec<String>) -> Self {
        Self { frame_ids }
    }

    /// 解析有效文档，永不失败
    ///
    /// 跨域拒绝和 frame 不存在一样处理为"未找到"
    pub async fn resolve<P: AutomationPort + ?Sized>(&self, port: &P) -> DocumentRef {
        for frame_id in &self.frame_ids {
            match port.frame_document(frame_id).await {
                Ok(Some(doc)) => {
                    debug!("使用嵌套文档: {}", doc);
                    return doc;
                }
                Ok(None) => {}
                Err(e) => debug!("frame {} 不可用: {}", frame_id, e),
            }
        }
        DocumentRef::Top
    }
}

impl Default for DocumentLocator {
    fn default() -> Self {
        Self::new()
    }
}
