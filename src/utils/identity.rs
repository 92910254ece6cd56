//! 浏览器身份伪装
//!
//! 每个任务的浏览器上下文从固定池中随机分配 User-Agent 和视口尺寸，
//! 语言区域和时区固定为 en-US / America/New_York，以降低指纹识别概率。

use rand::seq::SliceRandom;

/// 固定 User-Agent 池
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// 固定视口尺寸池
const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1680, 1050),
    (1600, 900),
    (1440, 900),
    (1366, 768),
];

/// 固定语言区域
pub const LOCALE: &str = "en-US";
/// 固定时区
pub const TIMEZONE: &str = "America/New_York";

/// 随机化的浏览器身份
#[derive(Debug, Clone)]
pub struct BrowserIdentity {
    pub user_agent: &'static str,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl BrowserIdentity {
    /// 从固定池中随机抽取一个身份
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
        let (viewport_width, viewport_height) =
            VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);
        Self {
            user_agent,
            viewport_width,
            viewport_height,
        }
    }
}

/// 注入每个新页面的反检测脚本
///
/// 隐藏 navigator.webdriver 等自动化痕迹
pub const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;
