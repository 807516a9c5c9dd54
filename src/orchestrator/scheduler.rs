//! 定时调度器 - 编排层
//!
//! 在本机时钟的下一个整点/半点触发一次，之后按固定周期重复触发。
//!
//! - 只在启动时对齐一次，之后的周期不再根据时钟变化修正
//! - 回调本身不允许阻塞，长任务请在回调里 spawn

use chrono::{DateTime, Local, TimeZone, Timelike};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::{Alignment, ScheduleRule};

/// 不早于 `now` 的最近一个对齐时刻；恰好落在边界上时返回 `now` 本身
pub fn next_boundary<Tz: TimeZone>(now: &DateTime<Tz>, alignment: Alignment) -> DateTime<Tz> {
    let delay = delay_until_boundary(now, alignment);
    // delay 最多一个周期，转换不会溢出
    now.clone() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

/// 距离下一个对齐时刻还有多久（按墙上时间计算分钟）
pub fn delay_until_boundary<Tz: TimeZone>(now: &DateTime<Tz>, alignment: Alignment) -> Duration {
    let step_secs = u64::from(alignment.minutes()) * 60;
    let into_period = Duration::new(
        u64::from(now.minute() % alignment.minutes()) * 60 + u64::from(now.second()),
        // 闰秒时 nanosecond 可能 >= 1e9
        now.nanosecond().min(999_999_999),
    );

    if into_period.is_zero() {
        Duration::ZERO
    } else {
        Duration::from_secs(step_secs) - into_period
    }
}

/// 已启动的定时任务；drop 时自动取消
#[derive(Debug)]
pub struct ScheduleHandle {
    rule: ScheduleRule,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn rule(&self) -> ScheduleRule {
        self.rule
    }

    pub fn cancel(&self) {
        if !self.task.is_finished() {
            debug!("⏹️ 取消定时任务 ({:?})", self.rule.alignment);
        }
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 首次触发之后的周期定时器：第一拍在 `anchor + period`
fn recurring_ticker(anchor: Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(anchor + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

pub struct Scheduler;

impl Scheduler {
    /// 以本机当前时间为基准启动
    pub fn arm<F>(rule: ScheduleRule, on_fire: F) -> ScheduleHandle
    where
        F: FnMut() + Send + 'static,
    {
        Self::arm_at(rule, &Local::now(), on_fire)
    }

    /// 以给定时间为基准启动，`now` 只用来计算第一次触发的延迟
    pub fn arm_at<Tz, F>(rule: ScheduleRule, now: &DateTime<Tz>, mut on_fire: F) -> ScheduleHandle
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
        F: FnMut() + Send + 'static,
    {
        let delay = delay_until_boundary(now, rule.alignment);
        let period = rule.period();
        info!(
            "⏰ 定时任务已启动: 首次触发 {} (等待 {:.1}s)，之后每 {} 分钟",
            next_boundary(now, rule.alignment).format("%H:%M:%S"),
            delay.as_secs_f64(),
            rule.alignment.minutes()
        );

        let first = Instant::now() + delay;
        let task = tokio::spawn(async move {
            sleep_until(first).await;
            on_fire();

            // 以首次触发的时刻为锚点，回调耗时不会让相位漂移
            let mut ticker = recurring_ticker(first, period);
            loop {
                ticker.tick().await;
                on_fire();
            }
        });

        ScheduleHandle { rule, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, h, m, s).unwrap() + chrono::Duration::milliseconds(ms as i64)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = fired.clone();
        (fired, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_next_boundary_hourly() {
        assert_eq!(next_boundary(&at(9, 59, 58, 500), Alignment::Hourly), at(10, 0, 0, 0));
        assert_eq!(next_boundary(&at(9, 0, 0, 1), Alignment::Hourly), at(10, 0, 0, 0));
    }

    #[test]
    fn test_next_boundary_half_hourly() {
        assert_eq!(next_boundary(&at(9, 10, 0, 0), Alignment::HalfHourly), at(9, 30, 0, 0));
        assert_eq!(next_boundary(&at(9, 45, 0, 0), Alignment::HalfHourly), at(10, 0, 0, 0));
    }

    #[test]
    fn test_exact_boundary_has_zero_delay() {
        assert_eq!(delay_until_boundary(&at(10, 0, 0, 0), Alignment::Hourly), Duration::ZERO);
        assert_eq!(delay_until_boundary(&at(10, 30, 0, 0), Alignment::HalfHourly), Duration::ZERO);
        assert_eq!(
            delay_until_boundary(&at(10, 30, 0, 0), Alignment::Hourly),
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_alignment_uses_wall_clock_of_timezone() {
        // UTC+05:30 的 10:00 是 UTC 的 04:30
        let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = offset.with_ymd_and_hms(2026, 2, 10, 9, 50, 0).unwrap();
        let boundary = next_boundary(&now, Alignment::Hourly);
        assert_eq!(boundary.hour(), 10);
        assert_eq!(boundary.minute(), 0);
        assert_eq!(boundary.with_timezone(&Utc), at(4, 30, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_boundary_then_every_period() {
        let (fired, on_fire) = counter();
        let _handle = Scheduler::arm_at(
            ScheduleRule::new(Alignment::Hourly),
            &at(9, 59, 58, 500),
            on_fire,
        );

        sleep(Duration::from_millis(1_400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(3_600_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        sleep(Duration::from_millis(7_200_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_ticks_stay_on_first_fire_phase() {
        let anchor = Instant::now();
        let period = Duration::from_secs(1_800);
        let mut ticker = recurring_ticker(anchor, period);

        // 模拟一次耗时的回调：创建定时器之后才开始等待
        sleep(Duration::from_millis(250)).await;
        assert_eq!(ticker.tick().await, anchor + period);
        assert_eq!(ticker.tick().await, anchor + period * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_fires() {
        let (fired, on_fire) = counter();
        let handle = Scheduler::arm_at(
            ScheduleRule::new(Alignment::HalfHourly),
            &at(9, 29, 59, 0),
            on_fire,
        );

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        handle.cancel();
        sleep(Duration::from_millis(3_600_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (fired, on_fire) = counter();
        let handle = Scheduler::arm_at(ScheduleRule::new(Alignment::Hourly), &at(9, 59, 0, 0), on_fire);
        drop(handle);

        sleep(Duration::from_millis(3_700_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
