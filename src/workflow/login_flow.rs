//! 登录流程 - 流程层
//!
//! 状态机：`Idle → Attempting → {Success, Exhausted}`，每次调用只到达一个终态。
//!
//! 流程顺序：
//! 1. 立即填写学号 + 密码，两者都成功则（按模式）提交 → Success
//! 2. 不完整时点击"打开登录"入口，按递增的偏移重试
//! 3. 同一窗口内观察文档变更，每次变更都触发一次重新填写
//! 4. 窗口耗尽仍未完成 → Exhausted

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::AutomationError;
use crate::infrastructure::{AutomationPort, DocumentRef};
use crate::models::{AutomationTarget, Credential};
use crate::services::{DocumentLocator, FormFiller, SelectorResolver, SubmissionTrigger};

/// 登录模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// 只填写，不提交
    FillOnly,
    /// 填写后自动提交
    FullAuto,
}

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Attempting,
    Success,
    Exhausted,
}

/// 一次调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// 两个字段都已填写（FullAuto 下已提交）
    Success,
    /// 窗口耗尽
    Exhausted,
    /// 守卫未通过（无凭据或窗口已关闭），状态保持 Idle
    Skipped,
}

impl LoginOutcome {
    pub fn is_success(self) -> bool {
        self == LoginOutcome::Success
    }
}

/// 重试参数
#[derive(Debug, Clone)]
pub struct LoginFlowOptions {
    /// 相对进入 Attempting 的重试偏移，必须递增
    pub retry_offsets: Vec<Duration>,
    /// 重试和变更观察的总窗口
    pub window: Duration,
}

impl Default for LoginFlowOptions {
    fn default() -> Self {
        Self {
            retry_offsets: [100, 200, 400, 600]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            window: Duration::from_millis(5000),
        }
    }
}

/// 单次尝试后两个字段的填写情况
#[derive(Debug, Default, Clone, Copy)]
struct FillProgress {
    username: bool,
    password: bool,
}

impl FillProgress {
    fn complete(self) -> bool {
        self.username && self.password
    }
}

/// 登录流程
///
/// - 不持有 port，由调用方传入
/// - 同一次调用内的重试、变更触发在一个 select 循环里串行执行
pub struct LoginFlow {
    locator: DocumentLocator,
    resolver: SelectorResolver,
    options: LoginFlowOptions,
}

impl LoginFlow {
    pub fn new(options: LoginFlowOptions) -> Self {
        Self {
            locator: DocumentLocator::new(),
            resolver: SelectorResolver::new(),
            options,
        }
    }

    pub fn options(&self) -> &LoginFlowOptions {
        &self.options
    }

    /// 执行一次登录流程
    pub async fn run<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        credential: Option<&Credential>,
        mode: LoginMode,
    ) -> LoginOutcome {
        let mut state = LoginState::Idle;

        // ========== 守卫 ==========
        let Some(credential) = credential else {
            warn!("⚠️ 跳过自动登录: {}", AutomationError::Config("未保存登录凭据".to_string()));
            return LoginOutcome::Skipped;
        };
        if !port.is_alive().await {
            warn!("⚠️ 跳过自动登录: {}", AutomationError::WindowClosed);
            return LoginOutcome::Skipped;
        }

        transition(&mut state, LoginState::Attempting);
        info!("🔐 开始自动登录 ({:?})", credential);
        let started = Instant::now();

        // ========== 立即尝试 ==========
        if self.attempt(port, credential, mode).await {
            transition(&mut state, LoginState::Success);
            return LoginOutcome::Success;
        }

        let doc = self.locator.resolve(port).await;
        if let Some(opener) = self
            .resolver
            .find(port, &doc, AutomationTarget::OpenLogin)
            .await
        {
            match port.activate(opener).await {
                Ok(()) => debug!("已点击登录入口"),
                Err(e) => debug!("点击登录入口失败: {}", e),
            }
        }

        // ========== 窗口内重试 + 变更观察 ==========
        let mut mutations = match port.watch_mutations(&doc).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                debug!("无法观察文档变更: {}", e);
                None
            }
        };

        let deadline = started + self.options.window;
        let mut offsets = self.options.retry_offsets.iter().peekable();
        let mut attempts = 1usize;

        let outcome = loop {
            let next_retry = offsets.peek().map(|offset| started + **offset);

            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    break LoginOutcome::Exhausted;
                }
                _ = sleep_until(next_retry.unwrap_or(deadline)), if next_retry.is_some() => {
                    offsets.next();
                }
                _ = next_mutation(&mut mutations) => {
                    debug!("文档发生变更，重新填写");
                }
            }

            if !port.is_alive().await {
                warn!("⚠️ 登录过程中窗口已关闭");
                break LoginOutcome::Exhausted;
            }

            attempts += 1;
            if self.attempt(port, credential, mode).await {
                break LoginOutcome::Success;
            }
        };

        if let Err(e) = port.unwatch_mutations(&doc).await {
            debug!("停止变更观察失败: {}", e);
        }

        match outcome {
            LoginOutcome::Success => {
                transition(&mut state, LoginState::Success);
                info!("✅ 自动登录完成 (第 {} 次尝试)", attempts);
            }
            _ => {
                transition(&mut state, LoginState::Exhausted);
                let window_ms = self.options.window.as_millis() as u64;
                warn!(
                    "⚠️ 自动登录未完成 ({} 次尝试): {}",
                    attempts,
                    AutomationError::TimingExhausted { window_ms }
                );
            }
        }
        outcome
    }

    /// 填写两个字段，完成后按模式提交
    async fn attempt<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        credential: &Credential,
        mode: LoginMode,
    ) -> bool {
        let doc = self.locator.resolve(port).await;
        let progress = FillProgress {
            username: self
                .fill_if_needed(port, &doc, AutomationTarget::Username, &credential.identifier)
                .await,
            password: self
                .fill_if_needed(port, &doc, AutomationTarget::Password, &credential.secret)
                .await,
        };
        debug!("填写进度: {:?}", progress);

        if !progress.complete() {
            return false;
        }
        if mode == LoginMode::FullAuto {
            SubmissionTrigger::new(&self.resolver).submit(port, &doc).await;
        }
        true
    }

    /// 字段已是目标值时视为已填写，不再派发事件
    async fn fill_if_needed<P: AutomationPort + ?Sized>(
        &self,
        port: &P,
        doc: &DocumentRef,
        role: AutomationTarget,
        value: &str,
    ) -> bool {
        let filler = FormFiller::new(&self.resolver);
        let Some(element) = filler.locate(port, doc, role).await else {
            return false;
        };
        if let Ok(current) = port.value(element).await {
            if current == value {
                return true;
            }
        }
        filler.fill(port, doc, role, value).await
    }
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new(LoginFlowOptions::default())
    }
}

fn transition(state: &mut LoginState, next: LoginState) {
    debug!("登录状态: {:?} -> {:?}", state, next);
    *state = next;
}

/// 等待下一次变更通知；没有观察器或通道关闭后永远挂起
async fn next_mutation(rx: &mut Option<mpsc::Receiver<()>>) {
    if let Some(inner) = rx {
        if inner.recv().await.is_some() {
            return;
        }
        *rx = None;
    }
    std::future::pending::<()>().await
}
