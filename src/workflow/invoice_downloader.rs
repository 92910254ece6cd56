//! 发票下载模板
//!
//! 登录门户（按候选选择器填用户名/密码）、用 LLM 规划找到发票入口、
//! 在页面内抓取 PDF 字节并上传到对象存储。

use anyhow::Result;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::infrastructure::PageDriver;
use crate::models::ProgressEvent;
use crate::workflow::extract_json_object;
use crate::workflow::template::{Template, TemplateCtx};

/// pdf_invoice_downloader 模板
pub struct InvoiceDownloader;

const USERNAME_SELECTORS: &[&str] = &[
    "input[type=\"email\"]",
    "input[type=\"text\"][name*=\"user\"]",
    "input[name=\"username\"]",
    "input[name=\"email\"]",
    "input[id=\"username\"]",
    "input[id=\"email\"]",
    "input[autocomplete=\"username\"]",
];

const PASSWORD_SELECTORS: &[&str] = &[
    "input[type=\"password\"]",
    "input[name=\"password\"]",
    "input[id=\"password\"]",
];

const LOGIN_SUBMIT_SELECTORS: &[&str] = &["button[type=\"submit\"]", "input[type=\"submit\"]"];

/// 在页面内抓取 PDF 链接的字节并返回 base64
const FETCH_PDF_JS: &str = r#"(async () => {
    const link = document.querySelector('a[href*=".pdf"]');
    if (!link) return null;
    try {
        const response = await fetch(link.href, { credentials: 'include' });
        if (!response.ok) return null;
        const buffer = await response.arrayBuffer();
        let binary = '';
        const bytes = new Uint8Array(buffer);
        for (let i = 0; i < bytes.length; i++) binary += String.fromCharCode(bytes[i]);
        return btoa(binary);
    } catch (e) {
        return null;
    }
})()"#;

impl InvoiceDownloader {
    /// 按候选选择器填写第一个可见命中的字段
    async fn fill_first(page: &dyn PageDriver, selectors: &[&str], value: &str) -> bool {
        for selector in selectors {
            match page.fill(selector, value).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("填写 {} 失败: {}", selector, e),
            }
        }
        false
    }

    async fn click_first(page: &dyn PageDriver, selectors: &[&str]) -> bool {
        for selector in selectors {
            match page.click(selector).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("点击 {} 失败: {}", selector, e),
            }
        }
        false
    }
}

#[async_trait::async_trait]
impl Template for InvoiceDownloader {
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue> {
        let portal_url = params
            .get("portalUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("portalUrl 参数缺失"))?;
        let credentials = params
            .get("loginCredentials")
            .and_then(|v| v.as_object())
            .ok_or_else(|| anyhow::anyhow!("loginCredentials 参数缺失"))?;
        let invoice_identifier = params
            .get("invoiceIdentifier")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("invoiceIdentifier 参数缺失"))?;

        let username = credentials.get("username").and_then(|v| v.as_str()).unwrap_or("");
        let password = credentials.get("password").and_then(|v| v.as_str()).unwrap_or("");

        ctx.reporter
            .report(job_id, ProgressEvent::log("Navigating to portal..."))
            .await;
        ctx.page.navigate(portal_url).await?;
        sleep(Duration::from_secs(2)).await;

        // ========== 登录 ==========
        ctx.reporter
            .report(job_id, ProgressEvent::log("Attempting login..."))
            .await;
        if Self::fill_first(ctx.page.as_ref(), USERNAME_SELECTORS, username).await {
            ctx.reporter
                .report(job_id, ProgressEvent::log("Username entered"))
                .await;
        }
        if Self::fill_first(ctx.page.as_ref(), PASSWORD_SELECTORS, password).await {
            ctx.reporter
                .report(job_id, ProgressEvent::log("Password entered"))
                .await;
        }
        Self::click_first(ctx.page.as_ref(), LOGIN_SUBMIT_SELECTORS).await;
        sleep(Duration::from_secs(3)).await;

        ctx.reporter
            .report(
                job_id,
                ProgressEvent::log("Login attempted, searching for invoice..."),
            )
            .await;

        // ========== LLM 规划发票入口 ==========
        let html = ctx.page.content().await?;
        let snippet: String = html.chars().take(5000).collect();
        let screenshot_b64 = match ctx.page.screenshot(false).await {
            Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!("门户截图失败: {}", e);
                None
            }
        };

        let prompt = format!(
            "I need to find and download an invoice with identifier \"{}\" from this portal.\n\
             Looking at the page, describe the steps needed to navigate to the invoice download.\n\
             If there's a search field, provide the CSS selector.\n\n\
             Return a JSON with:\n\
             - \"searchSelector\": CSS selector for search input (or null)\n\
             - \"invoiceLink\": direct link to invoice if visible (or null)\n\
             - \"nextSteps\": description of what to do next\n\n\
             HTML (first 5000 chars):\n{}",
            invoice_identifier, snippet
        );

        let nav_instructions = match ctx
            .router
            .generate(&prompt, screenshot_b64.as_deref(), true)
            .await
        {
            Ok(answer) => extract_json_object(&answer).unwrap_or_else(|| json!({})),
            Err(e) => {
                warn!("LLM 规划失败: {}", e);
                json!({})
            }
        };

        if let Some(search_selector) = nav_instructions.get("searchSelector").and_then(|v| v.as_str())
        {
            match ctx.page.fill(search_selector, invoice_identifier).await {
                Ok(true) => {
                    sleep(Duration::from_secs(3)).await;
                    ctx.reporter
                        .report(
                            job_id,
                            ProgressEvent::log(format!(
                                "Searched for invoice: {}",
                                invoice_identifier
                            )),
                        )
                        .await;
                }
                Ok(false) => {}
                Err(e) => warn!("发票搜索失败: {}", e),
            }
        }

        // ========== 抓取并上传 PDF ==========
        let mut pdf_url = None;
        match ctx.page.eval(FETCH_PDF_JS.to_string()).await {
            Ok(JsonValue::String(encoded)) => {
                match base64::engine::general_purpose::STANDARD.decode(&encoded) {
                    Ok(bytes) => {
                        let filename = format!("invoice_{}.pdf", invoice_identifier);
                        match ctx
                            .storage
                            .upload_file(&bytes, job_id, &filename, "application/pdf")
                            .await
                        {
                            Ok(url) => {
                                ctx.reporter
                                    .report(
                                        job_id,
                                        ProgressEvent::log(format!("Invoice downloaded: {}", url)),
                                    )
                                    .await;
                                pdf_url = Some(url);
                            }
                            Err(e) => warn!("发票上传失败: {}", e),
                        }
                    }
                    Err(e) => warn!("PDF base64 解码失败: {}", e),
                }
            }
            Ok(_) => {
                ctx.reporter
                    .report(
                        job_id,
                        ProgressEvent::log("Could not download PDF automatically"),
                    )
                    .await;
            }
            Err(e) => warn!("PDF 抓取失败: {}", e),
        }

        Ok(json!({
            "invoiceIdentifier": invoice_identifier,
            "pdfUrl": pdf_url,
            "portalUrl": portal_url,
            "success": pdf_url.is_some(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{HandoffDetector, LlmRouter};
    use crate::testing::{FakePage, MemoryReporter, MemoryStorage};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_login_and_pdf_upload() {
        let page = Arc::new(FakePage::new());
        page.allow_fill("input[name=\"username\"]");
        page.allow_fill("input[type=\"password\"]");
        page.allow_click("button[type=\"submit\"]");
        // FETCH_PDF_JS 的返回值：一段 base64
        page.push_eval_response(serde_json::json!(base64::engine::general_purpose::STANDARD
            .encode(b"%PDF-1.4 fake")));

        let storage = Arc::new(MemoryStorage::new());
        let ctx = TemplateCtx {
            page: page.clone(),
            reporter: Arc::new(MemoryReporter::new()),
            router: Arc::new(LlmRouter::new(Vec::new())),
            handoff: Arc::new(HandoffDetector::new()),
            storage: storage.clone(),
            handoff_timeout: Duration::from_secs(300),
        };

        let params = serde_json::json!({
            "portalUrl": "https://portal.example.com",
            "loginCredentials": { "username": "u", "password": "p" },
            "invoiceIdentifier": "INV-42",
        });
        let result = InvoiceDownloader.run(&params, "job-inv", &ctx).await.unwrap();

        assert_eq!(result["success"], true);
        assert_eq!(result["invoiceIdentifier"], "INV-42");
        assert_eq!(storage.upload_count(), 1);
        assert!(result["pdfUrl"].as_str().unwrap().contains("invoice_INV-42.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pdf_is_not_fatal() {
        let page = Arc::new(FakePage::new());
        let ctx = TemplateCtx {
            page: page.clone(),
            reporter: Arc::new(MemoryReporter::new()),
            router: Arc::new(LlmRouter::new(Vec::new())),
            handoff: Arc::new(HandoffDetector::new()),
            storage: Arc::new(MemoryStorage::new()),
            handoff_timeout: Duration::from_secs(300),
        };

        let params = serde_json::json!({
            "portalUrl": "https://portal.example.com",
            "loginCredentials": { "username": "u", "password": "p" },
            "invoiceIdentifier": "INV-43",
        });
        let result = InvoiceDownloader.run(&params, "job-inv2", &ctx).await.unwrap();

        assert_eq!(result["success"], false);
        assert_eq!(result["pdfUrl"], JsonValue::Null);
    }
}
