//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"和"导航"的能力

use chromiumoxide::Page;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AutomationError, AutomationResult};

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() / goto() 能力
/// - 不认识登录表单或课程
/// - 不处理业务流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于事件订阅等操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AutomationResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        // 返回 undefined 时没有 value
        let json_value = result.into_value().unwrap_or(JsonValue::Null);
        Ok(json_value)
    }

    /// 当前页面 URL
    pub async fn url(&self) -> AutomationResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// 导航到指定 URL
    pub async fn goto(&self, url: &str) -> AutomationResult<()> {
        debug!("导航到: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| AutomationError::Script(format!("导航到 {} 失败: {}", url, e)))?;
        Ok(())
    }
}
