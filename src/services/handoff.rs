//! 人工接管检测 - 业务能力层
//!
//! 对页面做无状态的启发式扫描，识别需要人工介入的障碍（CAPTCHA / OTP）。
//! 按固定优先级求值：CAPTCHA 结构签名 → OTP 输入框签名 → OTP 文本兜底；
//! 结构命中但元素不可见时跳过该候选，继续向后检测。
//!
//! 这是尽力而为的信号，不是权威判定——调用方据此暂停自动化并上报，
//! 不把它当作证据。

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::infrastructure::PageDriver;
use crate::models::{HandoffKind, HandoffReport};

/// CAPTCHA 结构签名（已知厂商的 iframe/元素标记 + 通用 captcha 命名）
const CAPTCHA_SELECTORS: &[&str] = &[
    "iframe[src*=\"recaptcha\"]",
    "iframe[src*=\"hcaptcha\"]",
    "iframe[src*=\"challenges.cloudflare\"]",
    "iframe[src*=\"captcha\"]",
    "[class*=\"captcha\"]",
    "[id*=\"captcha\"]",
    "[class*=\"recaptcha\"]",
    "[id*=\"recaptcha\"]",
    "[class*=\"hcaptcha\"]",
    "[class*=\"cf-turnstile\"]",
    "[data-sitekey]",
    ".g-recaptcha",
    "#captcha",
];

/// OTP 输入框签名（type/autocomplete/name/placeholder 启发式）
const OTP_SELECTORS: &[&str] = &[
    "input[type=\"tel\"]",
    "input[autocomplete=\"one-time-code\"]",
    "input[name*=\"otp\"]",
    "input[name*=\"verification\"]",
    "input[name*=\"code\"]",
    "input[placeholder*=\"code\"]",
    "input[placeholder*=\"OTP\"]",
    "input[placeholder*=\"verification\"]",
];

/// OTP 相关短语（对可见文本做大小写不敏感扫描）
const OTP_TEXT_PATTERNS: &[&str] = &[
    r"enter.*(?:code|otp|verification)",
    r"(?:code|otp).*sent",
    r"two.?factor",
    r"2fa",
    r"verify.*(?:phone|email|identity)",
    r"one.?time.?password",
];

/// 人工接管检测器
pub struct HandoffDetector {
    otp_text_patterns: Vec<Regex>,
    resolution: Arc<Notify>,
}

impl HandoffDetector {
    pub fn new() -> Self {
        let otp_text_patterns = OTP_TEXT_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
            .collect();
        Self {
            otp_text_patterns,
            resolution: Arc::new(Notify::new()),
        }
    }

    /// 扫描页面，返回第一个命中的接管信号
    ///
    /// 求值顺序：
    /// 1. CAPTCHA 结构签名 - 第一个可见命中即短路返回 Captcha
    /// 2. OTP 输入框签名 - 第一个可见命中即短路返回 Otp
    /// 3. 可见文本的 OTP 短语兜底
    ///
    /// 单个选择器的探测失败被吞掉（只记 debug），继续后续候选。
    pub async fn detect(&self, page: &dyn PageDriver) -> Option<HandoffReport> {
        // ========== 1. CAPTCHA 结构签名 ==========
        for selector in CAPTCHA_SELECTORS {
            match page.probe(selector).await {
                Ok(probe) if probe.found && probe.visible => {
                    info!("检测到 CAPTCHA，命中: {}", selector);
                    return Some(HandoffReport {
                        kind: HandoffKind::Captcha,
                        rule: selector.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("探测 {} 失败: {}", selector, e),
            }
        }

        // ========== 2. OTP 输入框签名 ==========
        for selector in OTP_SELECTORS {
            match page.probe(selector).await {
                Ok(probe) if probe.found && probe.visible => {
                    info!("检测到 OTP 输入框，命中: {}", selector);
                    return Some(HandoffReport {
                        kind: HandoffKind::Otp,
                        rule: selector.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("探测 {} 失败: {}", selector, e),
            }
        }

        // ========== 3. 可见文本兜底 ==========
        let body_text = match page.visible_text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("读取页面文本失败: {}", e);
                return None;
            }
        };
        for pattern in &self.otp_text_patterns {
            if pattern.is_match(&body_text) {
                info!("检测到 OTP 文本模式: {}", pattern.as_str());
                return Some(HandoffReport {
                    kind: HandoffKind::Otp,
                    rule: pattern.as_str().to_string(),
                });
            }
        }

        None
    }

    /// 获取外部解除信号的触发端
    pub fn resolver(&self) -> HandoffResolver {
        HandoffResolver {
            notify: self.resolution.clone(),
        }
    }

    /// 挂起等待外部解除信号，返回是否在超时前解除
    pub async fn wait_for_resolution(&self, timeout: Duration) -> bool {
        info!("⏸ 等待人工接管解除（超时 {} 秒）", timeout.as_secs());
        match tokio::time::timeout(timeout, self.resolution.notified()).await {
            Ok(()) => {
                info!("✓ 人工接管已解除");
                true
            }
            Err(_) => {
                warn!("⚠️ 人工接管等待超时");
                false
            }
        }
    }
}

impl Default for HandoffDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// 接管解除信号的触发端（由外部信号源持有）
#[derive(Clone)]
pub struct HandoffResolver {
    notify: Arc<Notify>,
}

impl HandoffResolver {
    pub fn resolve(&self) {
        self.notify.notify_one();
    }
}
