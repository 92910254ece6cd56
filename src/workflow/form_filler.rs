//! 表单填写模板
//!
//! 每个字段按固定顺序尝试一组候选定位策略，以返回值（而非异常）判定
//! 是否命中；全部落空时退回 LLM 辅助定位。可选在最后提交表单。

use anyhow::Result;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::infrastructure::PageDriver;
use crate::models::ProgressEvent;
use crate::services::LlmRouter;
use crate::workflow::template::{Template, TemplateCtx};

/// form_filler 模板
pub struct FormFiller;

/// 字段定位策略（按顺序求值，第一个报告成功的胜出）
enum FillStrategy {
    /// 普通输入框/文本域
    Input(String),
    /// 下拉选择框
    Select(String),
}

impl FillStrategy {
    /// 一个字段名的候选策略列表
    fn candidates(field_name: &str) -> Vec<FillStrategy> {
        vec![
            FillStrategy::Input(format!("input[name=\"{}\"]", field_name)),
            FillStrategy::Input(format!("textarea[name=\"{}\"]", field_name)),
            FillStrategy::Select(format!("select[name=\"{}\"]", field_name)),
            FillStrategy::Input(format!("input[id=\"{}\"]", field_name)),
            FillStrategy::Input(format!("textarea[id=\"{}\"]", field_name)),
            FillStrategy::Input(format!("input[placeholder*=\"{}\" i]", field_name)),
            FillStrategy::Input(format!("textarea[placeholder*=\"{}\" i]", field_name)),
            FillStrategy::Input(format!("input[aria-label*=\"{}\" i]", field_name)),
        ]
    }

    /// 执行策略，返回是否命中（预期内的未命中是 Ok(false)，不是错误）
    async fn apply(&self, page: &dyn PageDriver, value: &str) -> bool {
        let result = match self {
            FillStrategy::Input(selector) => page.fill(selector, value).await,
            FillStrategy::Select(selector) => page.select_option(selector, value).await,
        };
        match result {
            Ok(hit) => hit,
            Err(e) => {
                debug!("策略执行失败: {}", e);
                false
            }
        }
    }
}

/// 提交按钮的候选选择器
const SUBMIT_SELECTORS: &[&str] = &["button[type=\"submit\"]", "input[type=\"submit\"]"];

/// 兜底：按钮文本匹配 Submit / Send / Save
const SUBMIT_BY_TEXT_JS: &str = r#"(() => {
    const labels = ['submit', 'send', 'save'];
    const buttons = Array.from(document.querySelectorAll('button, input[type="button"]'));
    for (const btn of buttons) {
        const text = (btn.innerText || btn.value || '').trim().toLowerCase();
        if (labels.some(l => text.includes(l))) { btn.click(); return true; }
    }
    return false;
})()"#;

impl FormFiller {
    /// 按候选策略填写单个字段，全部落空时退回 LLM 辅助定位
    async fn fill_field(
        page: &dyn PageDriver,
        router: &LlmRouter,
        field_name: &str,
        value: &str,
    ) -> bool {
        for strategy in FillStrategy::candidates(field_name) {
            if strategy.apply(page, value).await {
                return true;
            }
        }

        // ========== LLM 辅助定位 ==========
        let html = match page.content().await {
            Ok(html) => html,
            Err(e) => {
                warn!("读取页面内容失败: {}", e);
                return false;
            }
        };
        let snippet: String = html.chars().take(3000).collect();
        let prompt = format!(
            "Given this HTML form, find the CSS selector for the input field that corresponds to \"{}\".\n\
             Return ONLY the CSS selector, nothing else.\n\nHTML (first 3000 chars):\n{}",
            field_name, snippet
        );

        let selector = match router.generate(&prompt, None, false).await {
            Ok(answer) => answer
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .to_string(),
            Err(e) => {
                warn!("LLM 辅助定位失败 ({}): {}", field_name, e);
                return false;
            }
        };

        match page.fill(&selector, value).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("LLM 给出的选择器填写失败 ({}): {}", selector, e);
                false
            }
        }
    }

    /// 尝试提交表单，返回是否点中了提交按钮
    async fn submit(page: &dyn PageDriver) -> bool {
        for selector in SUBMIT_SELECTORS {
            match page.click(selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("点击 {} 失败: {}", selector, e),
            }
        }
        match page.eval(SUBMIT_BY_TEXT_JS.to_string()).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                debug!("按文本查找提交按钮失败: {}", e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Template for FormFiller {
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue> {
        let form_url = params
            .get("formUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("formUrl 参数缺失"))?;
        let field_values = params
            .get("fieldValues")
            .and_then(|v| v.as_object())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| anyhow::anyhow!("fieldValues 参数缺失"))?;
        let should_submit = params
            .get("submit")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        ctx.reporter
            .report(job_id, ProgressEvent::log("Navigating to form page..."))
            .await;
        ctx.page.navigate(form_url).await?;
        sleep(Duration::from_secs(2)).await;

        let mut filled_fields = Vec::new();
        let mut failed_fields = Vec::new();

        for (field_name, field_value) in field_values {
            ctx.reporter
                .report(job_id, ProgressEvent::log(format!("Filling field: {}", field_name)))
                .await;

            let value = match field_value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };

            if Self::fill_field(ctx.page.as_ref(), &ctx.router, field_name, &value).await {
                filled_fields.push(field_name.clone());
            } else {
                failed_fields.push(field_name.clone());
                ctx.reporter
                    .report(
                        job_id,
                        ProgressEvent::log(format!("Could not find field: {}", field_name)),
                    )
                    .await;
            }

            sleep(Duration::from_millis(500)).await;
        }

        if should_submit {
            ctx.reporter
                .report(job_id, ProgressEvent::log("Submitting form..."))
                .await;
            if !Self::submit(ctx.page.as_ref()).await {
                ctx.reporter
                    .report(job_id, ProgressEvent::log("Could not find submit button"))
                    .await;
            }
            sleep(Duration::from_secs(2)).await;
        }

        ctx.reporter
            .report(
                job_id,
                ProgressEvent::log(format!(
                    "Form filling complete. Filled: {}, Failed: {}",
                    filled_fields.len(),
                    failed_fields.len()
                )),
            )
            .await;

        Ok(json!({
            "filledFields": filled_fields,
            "failedFields": failed_fields,
            "submitted": should_submit,
            "url": form_url,
        }))
    }
}
