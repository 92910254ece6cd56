//! 通用任务执行器 - 流程层
//!
//! 处理只有自然语言描述（taskDescription）的任务：有界步数的规划循环，
//! 每一步把当前页面状态（URL、可见文本、视口截图）交给视觉 LLM，
//! 要求其返回下一个动作的严格 JSON，执行后进入下一步。
//!
//! 动作集合：navigate / click / fill / extract / done。
//! 连续 3 次无法解析出合法动作即中止任务；核心导航失败同样中止。

use anyhow::Result;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::models::ProgressEvent;
use crate::utils::logging::truncate_text;
use crate::workflow::extract_json_object;
use crate::workflow::template::TemplateCtx;

/// 连续解析失败的上限
const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// 通用 LLM 规划执行器
pub struct TaskExecutor {
    max_steps: usize,
}

impl TaskExecutor {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// 执行一个自然语言描述的任务
    pub async fn run(
        &self,
        task_description: &str,
        params: &JsonValue,
        job_id: &str,
        ctx: &TemplateCtx,
    ) -> Result<JsonValue> {
        ctx.reporter
            .report(job_id, ProgressEvent::log("Starting LLM-planned task..."))
            .await;

        let mut task = task_description.to_string();
        if params.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
            task = format!(
                "{}\n\nAdditional parameters:\n{}",
                task,
                serde_json::to_string_pretty(params).unwrap_or_default()
            );
        }

        let mut extracted: Vec<String> = Vec::new();
        let mut action_history: Vec<String> = Vec::new();
        let mut consecutive_failures = 0usize;
        let mut steps_taken = 0usize;

        for step in 1..=self.max_steps {
            steps_taken = step;

            // ========== 人工接管检测 ==========
            if let Some(report) = ctx.handoff.detect(ctx.page.as_ref()).await {
                ctx.reporter
                    .report(job_id, ProgressEvent::handoff(report.clone()))
                    .await;
                let resolved = ctx.handoff.wait_for_resolution(ctx.handoff_timeout).await;
                if !resolved {
                    anyhow::bail!("人工接管未在超时内解除: {}", report.rule);
                }
            }

            // ========== 收集页面状态 ==========
            let current_url = ctx.page.current_url().await.unwrap_or_default();
            let page_text = ctx
                .page
                .visible_text()
                .await
                .map(|t| truncate_text(&t, 3000))
                .unwrap_or_default();
            let screenshot_b64 = match ctx.page.screenshot(false).await {
                Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
                Err(e) => {
                    debug!("步骤 {} 截图失败: {}", step, e);
                    None
                }
            };

            // ========== 询问下一个动作 ==========
            let prompt = build_step_prompt(&task, &current_url, &page_text, &action_history);
            let answer = ctx
                .router
                .generate(&prompt, screenshot_b64.as_deref(), screenshot_b64.is_some())
                .await?;

            let Some(action) = extract_json_object(&answer) else {
                consecutive_failures += 1;
                warn!(
                    "步骤 {} 的 LLM 响应无法解析为动作 ({}/{})",
                    step, consecutive_failures, MAX_CONSECUTIVE_FAILURES
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    anyhow::bail!("LLM 连续 {} 次未返回合法动作", MAX_CONSECUTIVE_FAILURES);
                }
                continue;
            };
            consecutive_failures = 0;

            let kind = action.get("action").and_then(|v| v.as_str()).unwrap_or("");
            let log_msg = format!("Step {}: {}", step, kind);
            ctx.reporter.report(job_id, ProgressEvent::log(&log_msg)).await;
            action_history.push(format!("{}: {}", kind, action));
            info!("[任务 {}] 步骤 {}: {}", job_id, step, kind);

            // ========== 执行动作 ==========
            match kind {
                "navigate" => {
                    let url = action.get("url").and_then(|v| v.as_str()).unwrap_or("");
                    // 核心导航失败对任务是终态，直接上抛
                    ctx.page.navigate(url).await?;
                }
                "click" => {
                    let selector = action.get("selector").and_then(|v| v.as_str()).unwrap_or("");
                    match ctx.page.click(selector).await {
                        Ok(true) => {}
                        Ok(false) => warn!("点击无效果: {}", selector),
                        Err(e) => warn!("点击失败 ({}): {}", selector, e),
                    }
                }
                "fill" => {
                    let selector = action.get("selector").and_then(|v| v.as_str()).unwrap_or("");
                    let value = action.get("value").and_then(|v| v.as_str()).unwrap_or("");
                    match ctx.page.fill(selector, value).await {
                        Ok(true) => {}
                        Ok(false) => warn!("填写无效果: {}", selector),
                        Err(e) => warn!("填写失败 ({}): {}", selector, e),
                    }
                }
                "extract" => {
                    if !page_text.is_empty() {
                        extracted.push(page_text.clone());
                    }
                }
                "done" => {
                    if let Some(summary) = action.get("summary").and_then(|v| v.as_str()) {
                        extracted.push(summary.to_string());
                    }
                    break;
                }
                other => {
                    warn!("未知动作: {}", other);
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        anyhow::bail!("LLM 连续 {} 次未返回合法动作", MAX_CONSECUTIVE_FAILURES);
                    }
                }
            }
        }

        let final_url = ctx.page.current_url().await.unwrap_or_default();
        ctx.reporter
            .report(job_id, ProgressEvent::log("LLM-planned task finished"))
            .await;

        Ok(json!({
            "extractedContent": extracted,
            "finalUrl": final_url,
            "stepsTaken": steps_taken,
        }))
    }
}

/// 构建单步规划提示词
fn build_step_prompt(
    task: &str,
    current_url: &str,
    page_text: &str,
    action_history: &[String],
) -> String {
    let history = if action_history.is_empty() {
        "(none)".to_string()
    } else {
        let recent: Vec<&String> = action_history.iter().rev().take(5).rev().collect();
        recent
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are controlling a web browser to complete this task:\n{}\n\n\
         Current URL: {}\n\nVisible page text (truncated):\n{}\n\n\
         Previous actions:\n{}\n\n\
         Decide the single next action. Return ONLY a JSON object, no other text:\n\
         {{\"action\": \"navigate\", \"url\": \"...\"}}\n\
         {{\"action\": \"click\", \"selector\": \"...\"}}\n\
         {{\"action\": \"fill\", \"selector\": \"...\", \"value\": \"...\"}}\n\
         {{\"action\": \"extract\"}}\n\
         {{\"action\": \"done\", \"summary\": \"...\"}}",
        task, current_url, page_text, history
    )
}
