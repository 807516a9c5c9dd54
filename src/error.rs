use thiserror::Error;

use crate::models::AutomationTarget;

/// 自动化过程中的错误
///
/// 所有变体都会在单次自动化流程的边界处被捕获，降级为结果值 + 一条日志，
/// 不会向宿主外壳传播。
#[derive(Debug, Error)]
pub enum AutomationError {
    /// 缺少凭据等配置
    #[error("配置错误: {0}")]
    Config(String),

    /// 在尝试窗口内没有找到匹配的可见元素
    #[error("未找到可见元素: {role}")]
    Lookup { role: AutomationTarget },

    /// 跨域 frame 访问被拒绝
    #[error("frame 访问被拒绝: {frame}")]
    Access { frame: String },

    /// 重试窗口耗尽，两个字段未能同时填写
    #[error("重试窗口已耗尽 ({window_ms}ms)")]
    TimingExhausted { window_ms: u64 },

    /// 宿主窗口已经不存在
    #[error("宿主窗口已关闭")]
    WindowClosed,

    /// 页面脚本执行失败
    #[error("页面脚本执行失败: {0}")]
    Script(String),
}

/// 宏循环启动错误，同步返回给调用方
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroError {
    /// 科目列表为空
    #[error("配置错误: 科目列表为空")]
    Config,

    /// 已经在运行
    #[error("宏已在运行中")]
    AlreadyRunning,
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读写设置文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("设置文件格式错误 ({key}): {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AutomationError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AutomationError::Script(err.to_string())
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(err: serde_json::Error) -> Self {
        AutomationError::Script(format!("JSON 解析失败: {}", err))
    }
}

/// 自动化结果类型
pub type AutomationResult<T> = Result<T, AutomationError>;
