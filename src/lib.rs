//! # Sugang Macro
//!
//! 수강신청（课程申请）页面的自动化引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page、设置文件），只暴露能力
//! - `AutomationPort` - 核心与页面之间唯一的接口
//! - `ChromiumPort` - 真实浏览器实现；`MemoryPort`（`testing` feature）- 内存文档，供测试使用
//! - `SettingsStore` - JSON 键值存储
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力只做一步
//! - `DocumentLocator` - 解析有效文档（顶层或一层 frame）
//! - `SelectorResolver` - 按角色的候选谓词查找第一个可见元素
//! - `FormFiller` / `SubmissionTrigger` - 填写 / 提交
//! - `BypassStrategy` - 清除页面上的反自动化计数器
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次"流程
//! - `LoginFlow` - 填写 → 提交，带重试窗口和变更观察
//! - `RegisterPass` - 宏循环的一轮：bypass → 导航 → 申请 → 刷新
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 整点 / 半点定时器
//! - `orchestrator/macro_loop` - 固定周期的抢课循环
//! - `orchestrator/session` - 设置存储、登录守卫与页面锁
//! - `orchestrator/app` - 浏览器生命周期和页面事件
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AutomationError, MacroError, StoreError};
pub use infrastructure::{AutomationPort, ChromiumPort, SettingsStore};
#[cfg(any(test, feature = "testing"))]
pub use infrastructure::MemoryPort;
pub use models::{Alignment, CourseQuery, Credential, MacroConfig, ScheduleRule};
pub use orchestrator::{App, AutomationSession, MacroLoop, RunOptions, Scheduler};
pub use workflow::{LoginFlow, LoginMode, LoginOutcome, RegisterPass};
