//! 档案抓取模板
//!
//! 导航到目标档案页，先做一次人工接管检测（登录墙/验证码很常见），
//! 然后把 HTML 和截图交给视觉 LLM 结构化提取。

use anyhow::Result;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::models::ProgressEvent;
use crate::workflow::extract_json_object;
use crate::workflow::template::{Template, TemplateCtx};

/// linkedin_scraper 模板
pub struct ProfileScraper;

#[async_trait::async_trait]
impl Template for ProfileScraper {
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue> {
        let profile_url = params
            .get("profileUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("profileUrl 参数缺失"))?;

        ctx.reporter
            .report(job_id, ProgressEvent::log("Navigating to LinkedIn profile..."))
            .await;
        ctx.page.navigate(profile_url).await?;
        sleep(Duration::from_secs(3)).await;

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

        ctx.reporter
            .report(job_id, ProgressEvent::log("Extracting profile data..."))
            .await;

        let html = ctx.page.content().await?;
        let snippet: String = html.chars().take(5000).collect();
        let screenshot_b64 = match ctx.page.screenshot(false).await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!("档案页截图失败: {}", e);
                None
            }
        };

        let prompt = format!(
            "Extract the following information from this LinkedIn profile page HTML.\n\
             Return a valid JSON object with these fields:\n\
             - name: string\n\
             - headline: string\n\
             - location: string (if available)\n\
             - experience: array of objects with \"title\", \"company\", \"duration\"\n\
             - education: array of objects with \"school\", \"degree\", \"field\"\n\
             - about: string (summary/about section)\n\n\
             If a field is not found, use null or empty array.\n\
             Only return the JSON, no other text.\n\nHTML content (first 5000 chars):\n{}",
            snippet
        );

        let answer = ctx
            .router
            .generate(&prompt, screenshot_b64.as_deref(), true)
            .await?;

        let mut result =
            extract_json_object(&answer).unwrap_or_else(|| json!({ "rawText": answer }));
        result["url"] = json!(profile_url);

        ctx.reporter
            .report(job_id, ProgressEvent::log("Profile data extracted successfully"))
            .await;

        Ok(result)
    }
}
