//! 宏循环 - 编排层
//!
//! 状态机：`Stopped → Running → Stopped`
//!
//! ## 职责
//!
//! 1. 校验配置并启动固定周期的定时任务（快速模式 100ms，普通模式 500ms）
//! 2. 每一轮计数，并委托 `RegisterPass` 执行一轮抢课
//! 3. 停止时立即取消定时任务，汇报累计轮数
//!
//! 正在执行的一轮不会被打断，停止信号只在两轮之间生效。
//! 每一轮都要先拿到页面锁（`PassLock`），所以停止后立刻重启时，
//! 新的一轮会等旧的一轮结束；与登录流程共用同一把锁时也互斥。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::MacroError;
use crate::infrastructure::AutomationPort;
use crate::models::MacroConfig;
use crate::workflow::{MacroCtx, RegisterPass};

/// 宏循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroState {
    Stopped,
    Running,
}

/// `stop()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// 本次运行累计的轮数
    pub attempts: u64,
    pub was_running: bool,
}

/// 同一页面上同一时间只允许一个流程（一轮抢课或一次登录）
pub type PassLock = Arc<AsyncMutex<()>>;

struct RunningLoop {
    counter: Arc<AtomicU64>,
    stop_tx: oneshot::Sender<()>,
    // 不 abort：停止后让正在执行的一轮自然结束
    _task: JoinHandle<()>,
}

pub struct MacroLoop<P: AutomationPort + ?Sized> {
    port: Arc<P>,
    pass: Arc<RegisterPass>,
    pass_lock: PassLock,
    running: Mutex<Option<RunningLoop>>,
}

impl<P: AutomationPort + ?Sized> MacroLoop<P> {
    pub fn new(port: Arc<P>, pass: RegisterPass) -> Self {
        Self::with_pass_lock(port, pass, PassLock::default())
    }

    /// 与其他流程共用一把页面锁
    pub fn with_pass_lock(port: Arc<P>, pass: RegisterPass, pass_lock: PassLock) -> Self {
        Self {
            port,
            pass: Arc::new(pass),
            pass_lock,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> MacroState {
        if self.running().is_some() {
            MacroState::Running
        } else {
            MacroState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MacroState::Running
    }

    /// 当前运行已执行的轮数；未运行时为 0
    pub fn attempts(&self) -> u64 {
        self.running()
            .as_ref()
            .map(|r| r.counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// 启动宏循环
    ///
    /// 先校验配置，再检查是否已在运行；已经在运行时原有定时任务保持不变
    pub fn start(&self, config: MacroConfig) -> Result<(), MacroError> {
        if config.subjects.is_empty() {
            warn!("⚠️ 科目列表为空，无法启动宏");
            return Err(MacroError::Config);
        }
        let mut running = self.running();
        if running.is_some() {
            warn!("⚠️ 宏已在运行中，忽略本次启动");
            return Err(MacroError::AlreadyRunning);
        }

        let period = config.tick_period();
        let counter = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        info!("{}", "=".repeat(60));
        info!(
            "🚀 宏已启动: {} 个科目，周期 {}ms{}",
            config.subjects.len(),
            period.as_millis(),
            if config.bypass_mode { "，已开启绕过" } else { "" }
        );
        info!("{}", "=".repeat(60));

        let port = self.port.clone();
        let pass = self.pass.clone();
        let pass_lock = self.pass_lock.clone();
        let tick_counter = counter.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // 等锁期间收到停止信号同样退出
                let page = tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    page = async {
                        ticker.tick().await;
                        pass_lock.clone().lock_owned().await
                    } => page,
                };

                // 在 select 之外执行，停止信号不会打断这一轮
                let tick = tick_counter.fetch_add(1, Ordering::SeqCst) + 1;
                pass.run(port.as_ref(), &config, &MacroCtx::new(tick)).await;
                drop(page);
            }
        });

        *running = Some(RunningLoop {
            counter,
            stop_tx,
            _task: task,
        });
        Ok(())
    }

    /// 停止宏循环；未运行时返回空报告
    pub fn stop(&self) -> StopReport {
        let Some(running) = self.running().take() else {
            return StopReport {
                attempts: 0,
                was_running: false,
            };
        };

        // 任务已自行结束时接收端已被丢弃，忽略发送失败
        let _ = running.stop_tx.send(());
        let attempts = running.counter.load(Ordering::SeqCst);
        info!("🛑 宏已停止，共执行 {} 轮", attempts);

        StopReport {
            attempts,
            was_running: true,
        }
    }
}

impl<P: AutomationPort + ?Sized> Drop for MacroLoop<P> {
    fn drop(&mut self) {
        if let Some(running) = self.running().take() {
            let _ = running.stop_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{DocumentRef, MemoryElement, MemoryPort};
    use crate::models::CourseQuery;
    use std::time::Duration;
    use tokio::time::sleep;

    const ENTRY: &str = "https://sugang.example.ac.kr/core";

    fn fast_config() -> MacroConfig {
        MacroConfig {
            subjects: vec![CourseQuery::new("COSE101", "")],
            fast_mode: true,
            bypass_mode: false,
        }
    }

    fn macro_loop(port: Arc<MemoryPort>) -> MacroLoop<MemoryPort> {
        MacroLoop::new(port, RegisterPass::new(ENTRY))
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_subjects_is_config_error() {
        let runner = macro_loop(Arc::new(MemoryPort::with_url(ENTRY)));

        let result = runner.start(MacroConfig::default());

        assert_eq!(result, Err(MacroError::Config));
        assert_eq!(runner.state(), MacroState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_subjects_rejected_even_while_running() {
        let runner = macro_loop(Arc::new(MemoryPort::with_url(ENTRY)));
        runner.start(fast_config()).unwrap();

        assert_eq!(runner.start(MacroConfig::default()), Err(MacroError::Config));
        assert!(runner.is_running());
        runner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_keeps_original_timer() {
        let runner = macro_loop(Arc::new(MemoryPort::with_url(ENTRY)));
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(250)).await;
        let before = runner.attempts();
        assert!(before >= 2);

        // 普通模式的第二次启动不会替换原有的 100ms 定时器
        let slow = MacroConfig {
            fast_mode: false,
            ..fast_config()
        };
        assert_eq!(runner.start(slow), Err(MacroError::AlreadyRunning));
        assert!(runner.is_running());

        sleep(Duration::from_millis(500)).await;
        assert!(runner.attempts() >= before + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_attempts_and_halts_ticks() {
        let port = Arc::new(MemoryPort::with_url(ENTRY));
        let search = port.add(&DocumentRef::Top, MemoryElement::button("조회"));
        let runner = macro_loop(port.clone());
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(450)).await;

        let report = runner.stop();
        assert!(report.was_running);
        assert!(report.attempts >= 4);
        assert_eq!(runner.state(), MacroState::Stopped);

        let refreshes = port.activations(search);
        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(port.activations(search), refreshes);

        assert_eq!(
            runner.stop(),
            StopReport {
                attempts: 0,
                was_running: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_clicks_register_for_matching_row() {
        let port = Arc::new(MemoryPort::with_url(ENTRY));
        let row = port.add(&DocumentRef::Top, MemoryElement::new("tr"));
        port.add_child(row, MemoryElement::new("td").text("COSE101 컴퓨터프로그래밍"));
        let apply = port.add_child(row, MemoryElement::button("신청"));

        let runner = macro_loop(port.clone());
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(50)).await;
        runner.stop();

        assert_eq!(port.activations(apply), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_counter() {
        let runner = macro_loop(Arc::new(MemoryPort::with_url(ENTRY)));
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(350)).await;
        runner.stop();

        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.attempts(), 1);
        runner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_running_pass() {
        let port = Arc::new(MemoryPort::with_url(ENTRY));
        let row = port.add(&DocumentRef::Top, MemoryElement::new("tr"));
        port.add_child(row, MemoryElement::new("td").text("COSE101 컴퓨터프로그래밍"));
        let apply = port.add_child(row, MemoryElement::button("신청"));
        port.set_read_delay(Duration::from_millis(80));

        let runner = macro_loop(port.clone());
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(30)).await;

        // 第一轮还卡在读取行文本上
        runner.stop();
        runner.start(fast_config()).unwrap();
        sleep(Duration::from_millis(600)).await;
        runner.stop();

        assert_eq!(port.max_concurrent_reads(), 1);
        assert!(port.activations(apply) >= 2);
    }
}
