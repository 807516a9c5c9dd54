//! 宏循环上下文
//!
//! 封装"这是第几次运行的第几轮"这一信息，只用于日志

use std::fmt::Display;

/// 宏循环单轮上下文
#[derive(Debug, Clone, Copy)]
pub struct MacroCtx {
    /// 本次运行中的轮次（从1开始）
    pub tick: u64,
}

impl MacroCtx {
    pub fn new(tick: u64) -> Self {
        Self { tick }
    }
}

impl Display for MacroCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[宏循环 第{}轮]", self.tick)
    }
}
