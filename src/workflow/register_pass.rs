//! 抢课单轮流程 - 流程层
//!
//! 核心职责：定义宏循环"一次 tick"的完整流程
//!
//! 流程顺序：
//! 1. bypass（可选）
//! 2. 不在申请页面时导航过去，本轮结束
//! 3. 逐个科目匹配结果行，命中则点击行内的申请按钮
//! 4. 点击查询按钮刷新结果，供下一轮使用

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::infrastructure::{AutomationPort, DocumentRef, ElementHandle};
use crate::models::{AutomationTarget, CourseQuery, MacroConfig, Predicate};
use crate::services::{BypassStrategy, DocumentLocator, SelectorResolver};
use crate::workflow::macro_ctx::MacroCtx;

/// 单轮结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 本轮发生了页面跳转
    pub navigated: bool,
    /// 本轮点击了申请按钮的科目代码
    pub registered: Vec<String>,
    /// 本轮是否点击了查询按钮
    pub refreshed: bool,
}

/// 抢课单轮流程
pub struct RegisterPass {
    locator: DocumentLocator,
    resolver: SelectorResolver,
    bypass: BypassStrategy,
    registration_url: String,
}

impl RegisterPass {
    pub fn new(registration_url: impl Into<String>) -> Self {
        Self {
            locator: DocumentLocator::new(),
            resolver: SelectorResolver::new(),
            bypass: BypassStrategy::default(),
            registration_url: registration_url.into(),
        }
    }

    pub fn with_bypass(mut self, bypass: BypassStrategy) -> Self {
        self.bypass = bypass;
        self
    }

    pub async fn run<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        config: &MacroConfig,
        ctx: &MacroCtx,
    ) -> PassReport {
        let mut report = PassReport::default();
        let doc = self.locator.resolve(port).await;

        if config.bypass_mode {
            self.bypass.apply(port, &doc).await;
        }

        // ========== 确保在申请页面 ==========
        if !self.on_registration_page(port, &doc).await {
            info!("{} 🧭 不在申请页面，跳转到 {}", ctx, self.registration_url);
            match port.navigate(&self.registration_url).await {
                Ok(()) => report.navigated = true,
                Err(e) => warn!("{} ⚠️ 跳转失败: {}", ctx, e),
            }
            return report;
        }

        // ========== 逐个科目匹配 ==========
        let rows = self.visible_rows(port, &doc).await;
        let mut row_texts = Vec::with_capacity(rows.len());
        for row in rows {
            match port.text(row).await {
                Ok(text) => row_texts.push((row, normalize_whitespace(&text))),
                Err(e) => debug!("读取行文本失败: {}", e),
            }
        }

        for course in &config.subjects {
            if self.register_course(port, &doc, course, &row_texts, ctx).await {
                report.registered.push(course.code.clone());
            }
        }

        // ========== 刷新结果 ==========
        if let Some(search) = self.resolver.find(port, &doc, AutomationTarget::Search).await {
            report.refreshed = port.activate(search).await.is_ok();
        }

        report
    }

    /// 查询按钮可见，或 URL 已在申请入口下
    async fn on_registration_page<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
    ) -> bool {
        if self
            .resolver
            .find(port, doc, AutomationTarget::Search)
            .await
            .is_some()
        {
            return true;
        }
        match port.current_url().await {
            Ok(url) => url.starts_with(&self.registration_url),
            Err(_) => false,
        }
    }

    async fn visible_rows<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
    ) -> Vec<ElementHandle> {
        let rows = match port.query(doc, None, &Predicate::tag("tr")).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("查询结果行失败: {}", e);
                return Vec::new();
            }
        };
        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            if port.is_visible(row).await.unwrap_or(false) {
                visible.push(row);
            }
        }
        visible
    }

    /// 第一条匹配行里找到申请按钮并点击
    async fn register_course<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        course: &CourseQuery,
        row_texts: &[(ElementHandle, String)],
        ctx: &MacroCtx,
    ) -> bool {
        for (row, text) in row_texts {
            if !course.matches(text) {
                continue;
            }
            let Some(button) = self
                .resolver
                .find_in(port, doc, Some(*row), AutomationTarget::Register)
                .await
            else {
                debug!("{} 行 [{}] 中没有申请按钮", ctx, text);
                continue;
            };
            match port.activate(button).await {
                Ok(()) => {
                    info!("{} 🎯 已点击申请: {} {}", ctx, course.code, course.name);
                    return true;
                }
                Err(e) => warn!("{} ⚠️ 点击申请失败 ({}): {}", ctx, course.code, e),
            }
        }
        false
    }
}

/// 表格单元格之间的换行、制表符压缩为单个空格
fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE
        .get_or_init(|| Regex::new(r"\s+").expect("空白正则是常量"))
        .replace_all(text.trim(), " ")
        .into_owned()
}
