use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 要抢的课程（科目代码 + 名称）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseQuery {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

impl CourseQuery {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// 行文本是否包含科目代码或（非空的）科目名称，忽略大小写
    pub fn matches(&self, row_text: &str) -> bool {
        let haystack = row_text.to_lowercase();
        let code = self.code.trim().to_lowercase();
        let name = self.name.trim().to_lowercase();
        (!code.is_empty() && haystack.contains(&code))
            || (!name.is_empty() && haystack.contains(&name))
    }
}

/// 宏循环配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroConfig {
    pub subjects: Vec<CourseQuery>,
    #[serde(default)]
    pub fast_mode: bool,
    #[serde(default)]
    pub bypass_mode: bool,
}

impl MacroConfig {
    /// 快速模式 100ms，普通模式 500ms
    pub fn tick_period(&self) -> Duration {
        if self.fast_mode {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(500)
        }
    }
}
