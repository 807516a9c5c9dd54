/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口；设置后连接已运行的浏览器，否则自行启动
    pub browser_debug_port: Option<u16>,
    /// 目标URL
    pub target_url: String,
    /// 课程申请页面入口；宏循环不在此页面时会跳转过去
    pub registration_url: String,
    /// 设置文件路径
    pub store_path: String,
    /// 自行启动浏览器时是否无头
    pub headless: bool,
    /// 自行启动浏览器时使用的可执行文件，缺省由 chromiumoxide 自动查找
    pub chrome_executable: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: None,
            target_url: "https://sugang.korea.ac.kr/".to_string(),
            registration_url: "https://sugang.korea.ac.kr/core".to_string(),
            store_path: "sugang-settings.json".to_string(),
            headless: false,
            chrome_executable: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).or(default.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            registration_url: std::env::var("REGISTRATION_URL").unwrap_or(default.registration_url),
            store_path: std::env::var("STORE_PATH").unwrap_or(default.store_path),
            headless: std::env::var("HEADLESS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().filter(|v| !v.trim().is_empty()).or(default.chrome_executable),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}
