//! 价格监控模板
//!
//! 导航到商品页，把页面 HTML 和视口截图交给视觉 LLM 提取价格信息，
//! 与目标价比较后返回。

use anyhow::Result;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::models::ProgressEvent;
use crate::workflow::extract_json_object;
use crate::workflow::template::{Template, TemplateCtx};

/// price_monitor 模板
pub struct PriceMonitor;

#[async_trait::async_trait]
impl Template for PriceMonitor {
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue> {
        let product_url = params
            .get("productUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("productUrl 参数缺失"))?;
        let target_price = params
            .get("targetPrice")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("targetPrice 参数缺失"))?;

        ctx.reporter
            .report(job_id, ProgressEvent::log("Navigating to product page..."))
            .await;
        ctx.page.navigate(product_url).await?;
        sleep(Duration::from_secs(3)).await;

        ctx.reporter
            .report(job_id, ProgressEvent::log("Extracting price information..."))
            .await;

        let html = ctx.page.content().await?;
        let snippet: String = html.chars().take(5000).collect();
        let screenshot_b64 = match ctx.page.screenshot(false).await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!("商品页截图失败: {}", e);
                None
            }
        };

        let prompt = format!(
            "Look at this product page and extract the current price.\n\
             Return ONLY a JSON object with these fields:\n\
             - productName: string (the product name)\n\
             - currentPrice: number (the current price as a number, no currency symbol)\n\
             - currency: string (e.g. \"USD\", \"EUR\")\n\
             - originalPrice: number or null (if there's a strikethrough/original price)\n\
             - inStock: boolean\n\n\
             Only return the JSON, no other text.\n\nHTML content (first 5000 chars):\n{}",
            snippet
        );

        let answer = ctx
            .router
            .generate(&prompt, screenshot_b64.as_deref(), true)
            .await?;

        let price_data = extract_json_object(&answer)
            .unwrap_or_else(|| json!({ "currentPrice": null, "productName": "Unknown" }));

        let current_price = price_data.get("currentPrice").and_then(|v| v.as_f64());
        let is_below = current_price.map(|p| p <= target_price).unwrap_or(false);

        let mut result = price_data;
        result["targetPrice"] = json!(target_price);
        result["isBelowTarget"] = json!(is_below);
        result["url"] = json!(product_url);

        let status_msg = format!(
            "Current price: {} (target: {}) - {} target",
            current_price.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string()),
            target_price,
            if is_below { "BELOW" } else { "ABOVE" }
        );
        ctx.reporter.report(job_id, ProgressEvent::log(status_msg)).await;

        Ok(result)
    }
}
