//! 页面驱动 - 基础设施层
//!
//! 持有唯一的 page 资源，向上只暴露能力（导航/探测/填写/截图/求值），
//! 引擎其余部分一律依赖 `PageDriver` trait，不直接接触 CDP 细节。
//!
//! 职责：
//! - 持有唯一的 Page 资源
//! - 暴露导航、元素探测、填写、点击、截图等能力
//! - 不认识 Job / Template
//! - 不处理业务流程

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{WorkerError, WorkerResult};

/// 元素探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ElementProbe {
    pub found: bool,
    pub visible: bool,
}

impl ElementProbe {
    pub const ABSENT: ElementProbe = ElementProbe {
        found: false,
        visible: false,
    };
}

/// 浏览器页面能力
///
/// 引擎组件（任务处理器、遥测循环、接管检测器、模板）只依赖本 trait；
/// 测试中以脚本化的假页面替代。
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到指定 URL（核心导航失败对任务而言是终态）
    async fn navigate(&self, url: &str) -> WorkerResult<()>;

    /// 当前页面 URL
    async fn current_url(&self) -> WorkerResult<String>;

    /// 页面 HTML 内容
    async fn content(&self) -> WorkerResult<String>;

    /// 页面可见文本（body innerText）
    async fn visible_text(&self) -> WorkerResult<String>;

    /// 探测选择器对应元素的存在性与可见性
    async fn probe(&self, selector: &str) -> WorkerResult<ElementProbe>;

    /// 向可见元素填写值，返回是否成功（未找到/不可见返回 Ok(false)，不抛错）
    async fn fill(&self, selector: &str, value: &str) -> WorkerResult<bool>;

    /// 点击元素，返回是否成功
    async fn click(&self, selector: &str) -> WorkerResult<bool>;

    /// 选择下拉框选项，返回是否成功
    async fn select_option(&self, selector: &str, value: &str) -> WorkerResult<bool>;

    /// 读取元素文本，未找到返回 Ok(None)
    async fn text_of(&self, selector: &str) -> WorkerResult<Option<String>>;

    /// 截图（PNG 字节）
    async fn screenshot(&self, full_page: bool) -> WorkerResult<Vec<u8>>;

    /// 覆盖视口尺寸
    async fn set_viewport(&self, width: u32, height: u32) -> WorkerResult<()>;

    /// 读取当前上下文的 Cookie（JSON 数组）
    async fn cookies(&self) -> WorkerResult<JsonValue>;

    /// 写入 Cookie（JSON 数组，逐条尽力解析）
    async fn set_cookies(&self, cookies: JsonValue) -> WorkerResult<()>;

    /// 执行 JS 代码并返回 JSON 结果
    async fn eval(&self, js_code: String) -> WorkerResult<JsonValue>;

    /// 关闭页面
    async fn close(&self) -> WorkerResult<()>;
}

/// 基于 CDP 的页面驱动实现
pub struct CdpPageDriver {
    page: Page,
    navigation_timeout: Duration,
}

impl CdpPageDriver {
    /// 创建新的页面驱动
    pub fn new(page: Page, navigation_timeout: Duration) -> Self {
        Self {
            page,
            navigation_timeout,
        }
    }

    /// 获取底层 page 的引用
    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval_inner(&self, js_code: String) -> WorkerResult<JsonValue> {
        let result = self
            .page
            .evaluate(js_code)
            .await
            .map_err(|e| WorkerError::browser("evaluate", e))?;
        let json_value = result
            .into_value()
            .map_err(|e| WorkerError::browser("evaluate", e))?;
        Ok(json_value)
    }

    async fn eval_as<T: serde::de::DeserializeOwned>(&self, js_code: String) -> WorkerResult<T> {
        let json_value = self.eval_inner(js_code).await?;
        let typed_value = serde_json::from_value(json_value)
            .map_err(|e| WorkerError::browser("evaluate", e))?;
        Ok(typed_value)
    }
}

/// 将选择器/值安全嵌入 JS 代码（JSON 字符串转义）
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    async fn navigate(&self, url: &str) -> WorkerResult<()> {
        let goto = self.page.goto(url);
        match tokio::time::timeout(self.navigation_timeout, goto).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(WorkerError::browser("navigate", e)),
            Err(_) => Err(WorkerError::browser(
                "navigate",
                format!("导航超时 ({:?}): {}", self.navigation_timeout, url),
            )),
        }
    }

    async fn current_url(&self) -> WorkerResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| WorkerError::browser("url", e))?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&self) -> WorkerResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| WorkerError::browser("content", e))
    }

    async fn visible_text(&self) -> WorkerResult<String> {
        self.eval_as(
            "(() => document.body ? document.body.innerText : '')()".to_string(),
        )
        .await
    }

    async fn probe(&self, selector: &str) -> WorkerResult<ElementProbe> {
        let js_code = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return {{ found: false, visible: false }};
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && rect.width > 0 && rect.height > 0;
                return {{ found: true, visible }};
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_as(js_code).await
    }

    async fn fill(&self, selector: &str, value: &str) -> WorkerResult<bool> {
        let js_code = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const rect = el.getBoundingClientRect();
                if (rect.width === 0 || rect.height === 0) return false;
                el.focus();
                const setter = Object.getOwnPropertyDescriptor(
                    el.tagName === 'TEXTAREA'
                        ? window.HTMLTextAreaElement.prototype
                        : window.HTMLInputElement.prototype,
                    'value');
                if (setter && setter.set) {{ setter.set.call(el, {val}); }} else {{ el.value = {val}; }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value)
        );
        self.eval_as(js_code).await
    }

    async fn click(&self, selector: &str) -> WorkerResult<bool> {
        let js_code = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_as(js_code).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> WorkerResult<bool> {
        let js_code = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el || el.tagName !== 'SELECT') return false;
                el.value = {val};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value)
        );
        self.eval_as(js_code).await
    }

    async fn text_of(&self, selector: &str) -> WorkerResult<Option<String>> {
        let js_code = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.innerText : null;
            }})()"#,
            sel = js_string(selector)
        );
        self.eval_as(js_code).await
    }

    async fn screenshot(&self, full_page: bool) -> WorkerResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| WorkerError::browser("screenshot", e))
    }

    async fn set_viewport(&self, width: u32, height: u32) -> WorkerResult<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                width as i64,
                height as i64,
                1.0,
                false,
            ))
            .await
            .map_err(|e| WorkerError::browser("viewport", e))?;
        Ok(())
    }

    async fn cookies(&self) -> WorkerResult<JsonValue> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| WorkerError::browser("cookies", e))?;
        let value = serde_json::to_value(cookies)
            .map_err(|e| WorkerError::browser("cookies", e))?;
        Ok(value)
    }

    async fn set_cookies(&self, cookies: JsonValue) -> WorkerResult<()> {
        let Some(entries) = cookies.as_array() else {
            return Ok(());
        };
        let params: Vec<chromiumoxide::cdp::browser_protocol::network::CookieParam> = entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect();
        if params.is_empty() {
            return Ok(());
        }
        self.page
            .set_cookies(params)
            .await
            .map_err(|e| WorkerError::browser("cookies", e))?;
        Ok(())
    }

    async fn eval(&self, js_code: String) -> WorkerResult<JsonValue> {
        self.eval_inner(js_code).await
    }

    async fn close(&self) -> WorkerResult<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| WorkerError::browser("close", e))?;
        Ok(())
    }
}
