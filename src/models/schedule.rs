use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 对齐方式：整点或半点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    Hourly,
    HalfHourly,
}

impl Alignment {
    /// 对齐边界之间的分钟数
    pub fn minutes(self) -> u32 {
        match self {
            Alignment::Hourly => 60,
            Alignment::HalfHourly => 30,
        }
    }

    /// 固定的重复周期
    pub fn period(self) -> Duration {
        match self {
            Alignment::Hourly => Duration::from_millis(3_600_000),
            Alignment::HalfHourly => Duration::from_millis(1_800_000),
        }
    }
}

/// 定时规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub alignment: Alignment,
}

impl ScheduleRule {
    pub fn new(alignment: Alignment) -> Self {
        Self { alignment }
    }

    pub fn period(&self) -> Duration {
        self.alignment.period()
    }
}
