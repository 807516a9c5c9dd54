//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有状态机和定时器，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 获取浏览器、安装页面钩子、等待退出
//!
//! ### `session` - 自动化会话
//! - 持有设置存储、登录守卫，以及登录与抢课共用的页面锁
//! - 把定时器 / 页面钩子的触发转交给登录流程
//!
//! ### `scheduler` - 整点 / 半点定时器
//!
//! ### `macro_loop` - 固定周期的抢课循环
//!
//! ## 层次关系
//!
//! ```text
//! app (Browser + 页面事件)
//!     ↓
//! session (设置存储 / 守卫 / 页面锁)
//!     ↓                 ↓
//! scheduler         macro_loop
//!     ↓                 ↓
//! workflow::LoginFlow   workflow::RegisterPass
//!     ↓
//! services (locator / resolver / filler / submit / bypass)
//!     ↓
//! infrastructure (AutomationPort)
//! ```

pub mod app;
pub mod macro_loop;
pub mod scheduler;
pub mod session;

pub use app::{App, BrowserSession, RunOptions};
pub use macro_loop::{MacroLoop, MacroState, PassLock, StopReport};
pub use scheduler::{delay_until_boundary, next_boundary, ScheduleHandle, Scheduler};
pub use session::{AutomationSession, PageEvent};
