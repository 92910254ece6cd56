//! 截图生成模板
//!
//! 导航到目标 URL，按参数设置视口，截取一张截图并上传。

use anyhow::Result;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};

use crate::models::ProgressEvent;
use crate::workflow::template::{Template, TemplateCtx};

/// screenshot_generator 模板
pub struct ScreenshotGenerator;

#[async_trait::async_trait]
impl Template for ScreenshotGenerator {
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("url 参数缺失"))?;

        let viewport = params.get("viewport");
        let width = viewport
            .and_then(|v| v.get("width"))
            .and_then(|v| v.as_u64())
            .unwrap_or(1920) as u32;
        let height = viewport
            .and_then(|v| v.get("height"))
            .and_then(|v| v.as_u64())
            .unwrap_or(1080) as u32;
        let full_page = params
            .get("fullPage")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        ctx.page.set_viewport(width, height).await?;

        ctx.reporter
            .report(job_id, ProgressEvent::log(format!("Navigating to {}...", url)))
            .await;
        ctx.page.navigate(url).await?;
        // 等待页面安定
        sleep(Duration::from_secs(2)).await;

        ctx.reporter
            .report(job_id, ProgressEvent::log("Taking screenshot..."))
            .await;
        let bytes = ctx.page.screenshot(full_page).await?;
        let screenshot_url = ctx.storage.upload_screenshot(&bytes, job_id).await?;

        ctx.reporter
            .report(
                job_id,
                ProgressEvent {
                    logs: vec!["Screenshot captured successfully".to_string()],
                    screenshots: vec![screenshot_url.clone()],
                    ..Default::default()
                },
            )
            .await;

        Ok(json!({
            "screenshotUrl": screenshot_url,
            "url": url,
            "viewport": { "width": width, "height": height },
            "fullPage": full_page,
        }))
    }
}
