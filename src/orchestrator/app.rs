//! 应用生命周期 - 编排层
//!
//! ## 职责
//!
//! 1. **初始化**：打开设置文件、获取浏览器、创建 `ChromiumPort` 和会话
//! 2. **页面钩子**：DOMContentLoaded / load 完成时触发自动登录
//! 3. **对话框**：自动接受申请后弹出的 alert / confirm
//! 4. **运行**：按参数启动定时登录、宏循环，等待 Ctrl+C 后清理
//!
//! 只有本模块持有 `Browser`。

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventJavascriptDialogOpening, EventLoadEventFired,
    HandleJavaScriptDialogParams,
};
use chromiumoxide::{Browser, Page};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{ChromiumPort, JsExecutor, SettingsStore};
use crate::models::{Alignment, ScheduleRule};
use crate::orchestrator::session::{AutomationSession, PageEvent};
use crate::services::fetch_server_clock;
use crate::utils::logging::{log_shutdown, log_startup};
use crate::workflow::LoginMode;

pub type BrowserSession = AutomationSession<ChromiumPort>;

/// `run` 子命令的参数
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 按整点 / 半点定时触发登录
    pub align: Option<Alignment>,
    /// 启动后立即开始宏循环
    pub start_macro: bool,
    /// 定时登录时自动提交
    pub full_auto: bool,
}

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    page: Page,
    session: Arc<BrowserSession>,
    hooks: Vec<JoinHandle<()>>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let store = SettingsStore::open(&config.store_path)
            .with_context(|| format!("无法打开设置文件 {}", config.store_path))?;

        let (browser, page) = browser::acquire(&config).await?;
        let port = Arc::new(ChromiumPort::new(JsExecutor::new(page.clone())));
        let session = Arc::new(AutomationSession::new(
            port,
            Arc::new(store),
            &config.registration_url,
        ));

        Ok(Self {
            config,
            _browser: browser,
            page,
            session,
            hooks: Vec::new(),
        })
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    /// 运行应用主逻辑，直到收到 Ctrl+C
    pub async fn run(mut self, options: RunOptions) -> Result<()> {
        self.log_server_clock().await;
        self.install_hooks().await?;

        // "ready" 即应用启动
        let session = self.session.clone();
        tokio::spawn(async move {
            session.on_page_event(PageEvent::Ready).await;
        });

        if let Some(alignment) = options.align {
            let mode = if options.full_auto {
                LoginMode::FullAuto
            } else {
                LoginMode::FillOnly
            };
            self.session.arm_schedule(ScheduleRule::new(alignment), mode);
        }

        if options.start_macro {
            self.session
                .start_macro()
                .context("宏循环启动失败，请先用 `subjects add` 添加科目")?;
        }

        info!("⌨️ 按 Ctrl+C 退出");
        tokio::signal::ctrl_c()
            .await
            .context("无法监听 Ctrl+C 信号")?;

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let report = self.session.shutdown();
        for hook in self.hooks.drain(..) {
            hook.abort();
        }
        log_shutdown(&report);
    }

    async fn log_server_clock(&self) {
        match fetch_server_clock(&self.config.target_url).await {
            Ok(clock) => info!(
                "🕒 服务器时间: {} (偏差 {:+}ms)",
                clock.server_local().format("%H:%M:%S"),
                clock.offset.num_milliseconds()
            ),
            Err(e) => warn!("⚠️ 读取服务器时间失败: {:#}", e),
        }
    }

    /// 订阅页面事件：生命周期钩子 + 对话框自动接受
    async fn install_hooks(&mut self) -> Result<()> {
        let dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await?;
        let load_finished = self.page.event_listener::<EventLoadEventFired>().await?;
        let dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await?;

        self.hooks.push(hook_page_event(
            self.session.clone(),
            dom_ready,
            PageEvent::DomReady,
        ));
        self.hooks.push(hook_page_event(
            self.session.clone(),
            load_finished,
            PageEvent::LoadFinished,
        ));
        self.hooks.push(accept_dialogs(self.page.clone(), dialogs));

        debug!("页面事件钩子已安装");
        Ok(())
    }
}

/// 每次事件触发一次自动登录；登录在独立任务里执行，不阻塞事件流
fn hook_page_event<S, E>(session: Arc<BrowserSession>, mut events: S, event: PageEvent) -> JoinHandle<()>
where
    S: Stream<Item = Arc<E>> + Unpin + Send + 'static,
    E: Send + Sync + 'static,
{
    tokio::spawn(async move {
        while events.next().await.is_some() {
            let session = session.clone();
            tokio::spawn(async move {
                session.on_page_event(event).await;
            });
        }
        debug!("[{}] 事件流结束", event);
    })
}

fn accept_dialogs<S>(page: Page, mut dialogs: S) -> JoinHandle<()>
where
    S: Stream<Item = Arc<EventJavascriptDialogOpening>> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(dialog) = dialogs.next().await {
            info!("💬 自动确认对话框: {}", dialog.message);
            if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                error!("确认对话框失败: {}", e);
            }
        }
    })
}
