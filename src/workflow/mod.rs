//! 流程层（Workflow Layer）
//!
//! 定义"一个任务"的完整处理流程：
//!
//! - `template` - `Template` 能力 + 静态注册表（标识 → 处理器）
//! - 五个内置模板：截图 / 表单填写 / 价格监控 / 档案抓取 / 发票下载
//! - `task_executor` - 只有自然语言描述的任务走 LLM 规划循环
//!
//! 模板不持有任何资源，只依赖 `TemplateCtx` 里的能力。

pub mod form_filler;
pub mod invoice_downloader;
pub mod price_monitor;
pub mod profile_scraper;
pub mod screenshot;
pub mod task_executor;
pub mod template;

pub use task_executor::TaskExecutor;
pub use template::{Template, TemplateCtx, TemplateRegistry};

use serde_json::Value as JsonValue;

/// 从 LLM 响应中提取第一个 JSON 对象
///
/// LLM 经常在 JSON 前后附带说明文字，取第一个 `{` 到最后一个 `}` 之间
/// 的片段尝试解析，失败返回 None。
pub(crate) fn extract_json_object(text: &str) -> Option<JsonValue> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
