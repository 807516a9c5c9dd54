//! 自动化会话 - 编排层
//!
//! 进程内唯一的会话对象，持有：
//! - 设置存储（凭据、科目和开关每次都从这里读取，CLI 也写同一份文件）
//! - 登录流程、宏循环、定时任务
//! - "同一时间只允许一次登录流程"的守卫，以及登录与抢课共用的页面锁
//!
//! 页面只通过 `AutomationPort` 访问，因此同一个会话既能驱动真实浏览器，
//! 也能驱动内存端口。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::MacroError;
use crate::infrastructure::{keys, AutomationPort, SettingsStore};
use crate::models::{Credential, MacroConfig, ScheduleRule};
use crate::orchestrator::macro_loop::{MacroLoop, MacroState, PassLock, StopReport};
use crate::orchestrator::scheduler::{ScheduleHandle, Scheduler};
use crate::workflow::{LoginFlow, LoginFlowOptions, LoginMode, LoginOutcome, RegisterPass};

/// 页面生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// 会话启动
    Ready,
    /// DOMContentLoaded
    DomReady,
    /// load 完成
    LoadFinished,
}

impl std::fmt::Display for PageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageEvent::Ready => write!(f, "ready"),
            PageEvent::DomReady => write!(f, "dom-ready"),
            PageEvent::LoadFinished => write!(f, "load-finished"),
        }
    }
}

/// 释放登录守卫
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AutomationSession<P: AutomationPort + ?Sized> {
    port: Arc<P>,
    store: Arc<SettingsStore>,
    login: LoginFlow,
    macro_loop: MacroLoop<P>,
    schedule: Mutex<Option<ScheduleHandle>>,
    login_in_flight: AtomicBool,
    pass_lock: PassLock,
}

impl<P: AutomationPort + ?Sized> AutomationSession<P> {
    pub fn new(port: Arc<P>, store: Arc<SettingsStore>, registration_url: &str) -> Self {
        Self::with_login_options(port, store, registration_url, LoginFlowOptions::default())
    }

    pub fn with_login_options(
        port: Arc<P>,
        store: Arc<SettingsStore>,
        registration_url: &str,
        options: LoginFlowOptions,
    ) -> Self {
        debug!(
            "会话已打开: 凭据={}，科目 {} 个",
            store
                .credential()
                .as_ref()
                .map(Credential::masked_identifier)
                .unwrap_or_else(|| "无".to_string()),
            store.subjects().len()
        );

        let pass_lock = PassLock::default();
        Self {
            macro_loop: MacroLoop::with_pass_lock(
                port.clone(),
                RegisterPass::new(registration_url),
                pass_lock.clone(),
            ),
            port,
            store,
            login: LoginFlow::new(options),
            schedule: Mutex::new(None),
            login_in_flight: AtomicBool::new(false),
            pass_lock,
        }
    }

    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn credential(&self) -> Option<Credential> {
        self.store.credential()
    }

    pub fn macro_config(&self) -> MacroConfig {
        self.store.macro_config()
    }

    /// 生命周期事件默认使用的登录模式
    pub fn preferred_login_mode(&self) -> LoginMode {
        if self.store.flag(keys::FAST_ACCESS) {
            LoginMode::FullAuto
        } else {
            LoginMode::FillOnly
        }
    }

    // ========== 登录 ==========

    /// 执行一次登录流程；已有流程在执行时直接跳过
    pub async fn login(&self, mode: LoginMode) -> LoginOutcome {
        if self
            .login_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("登录流程已在执行，跳过本次触发");
            return LoginOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.login_in_flight);
        // 等正在执行的一轮抢课结束
        let _page = self.pass_lock.lock().await;

        let credential = self.credential();
        self.login.run(self.port.as_ref(), credential.as_ref(), mode).await
    }

    /// 页面生命周期钩子：开启了保存登录时触发一次自动登录
    pub async fn on_page_event(&self, event: PageEvent) -> LoginOutcome {
        if !self.store.flag(keys::SAVE_LOGIN) {
            debug!("[{}] 未开启保存登录，忽略", event);
            return LoginOutcome::Skipped;
        }
        info!("[{}] 🔐 触发自动登录", event);
        self.login(self.preferred_login_mode()).await
    }

    // ========== 宏循环 ==========

    pub fn start_macro(&self) -> Result<(), MacroError> {
        self.macro_loop.start(self.macro_config())
    }

    pub fn stop_macro(&self) -> StopReport {
        self.macro_loop.stop()
    }

    pub fn macro_state(&self) -> MacroState {
        self.macro_loop.state()
    }

    // ========== 定时 ==========

    pub fn is_scheduled(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ScheduleHandle::is_active)
            .unwrap_or(false)
    }

    /// 取消定时任务并停止宏循环
    pub fn shutdown(&self) -> StopReport {
        if let Some(handle) = self
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.cancel();
        }
        self.stop_macro()
    }
}

impl<P: AutomationPort + ?Sized> AutomationSession<P> {
    /// 在后台执行一次登录流程
    pub fn spawn_login(self: &Arc<Self>, mode: LoginMode) -> JoinHandle<LoginOutcome> {
        let session = self.clone();
        tokio::spawn(async move { session.login(mode).await })
    }

    /// 启动整点/半点定时登录；再次调用会替换已有的定时任务
    ///
    /// 定时任务只持有会话的弱引用，会话释放后回调不再生效
    pub fn arm_schedule(self: &Arc<Self>, rule: ScheduleRule, mode: LoginMode) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = Scheduler::arm(rule, move || match weak.upgrade() {
            Some(session) => {
                info!("⏰ 到达对齐时刻，触发登录");
                session.spawn_login(mode);
            }
            None => warn!("⚠️ 会话已释放，忽略定时触发"),
        });

        let previous = self
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}
