//! 模板能力与静态注册表 - 流程层
//!
//! 每个模板实现 `Template{run(params, job_id, ctx) -> result}` 能力；
//! 模板标识到处理器的映射是编译期的静态表，启动时实例化并校验，
//! 不做运行时的字符串动态分发。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::infrastructure::{ObjectStorage, PageDriver};
use crate::services::{HandoffDetector, LlmRouter, ProgressReporter};

/// 模板运行上下文
///
/// 任务处理器在创建会话之后组装，模板只通过这里拿能力，不自建资源。
pub struct TemplateCtx {
    pub page: Arc<dyn PageDriver>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub router: Arc<LlmRouter>,
    pub handoff: Arc<HandoffDetector>,
    pub storage: Arc<dyn ObjectStorage>,
    /// 人工接管等待超时
    pub handoff_timeout: Duration,
}

/// 模板处理器能力
#[async_trait]
pub trait Template: Send + Sync {
    /// 执行模板逻辑，返回任务结果 JSON
    async fn run(&self, params: &JsonValue, job_id: &str, ctx: &TemplateCtx) -> Result<JsonValue>;
}

/// 内置模板种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Screenshot,
    FormFiller,
    PriceMonitor,
    ProfileScraper,
    InvoiceDownloader,
}

/// 模板标识 → 种类的静态映射
static TEMPLATE_SLUGS: phf::Map<&'static str, TemplateKind> = phf::phf_map! {
    "screenshot_generator" => TemplateKind::Screenshot,
    "form_filler" => TemplateKind::FormFiller,
    "price_monitor" => TemplateKind::PriceMonitor,
    "linkedin_scraper" => TemplateKind::ProfileScraper,
    "pdf_invoice_downloader" => TemplateKind::InvoiceDownloader,
};

fn instantiate(kind: TemplateKind) -> Arc<dyn Template> {
    match kind {
        TemplateKind::Screenshot => Arc::new(crate::workflow::screenshot::ScreenshotGenerator),
        TemplateKind::FormFiller => Arc::new(crate::workflow::form_filler::FormFiller),
        TemplateKind::PriceMonitor => Arc::new(crate::workflow::price_monitor::PriceMonitor),
        TemplateKind::ProfileScraper => Arc::new(crate::workflow::profile_scraper::ProfileScraper),
        TemplateKind::InvoiceDownloader => {
            Arc::new(crate::workflow::invoice_downloader::InvoiceDownloader)
        }
    }
}

/// 模板注册表
pub struct TemplateRegistry {
    handlers: HashMap<&'static str, Arc<dyn Template>>,
}

impl TemplateRegistry {
    /// 实例化全部内置模板（启动时调用一次）
    pub fn builtin() -> Self {
        let mut handlers = HashMap::new();
        for (slug, kind) in TEMPLATE_SLUGS.entries() {
            handlers.insert(*slug, instantiate(*kind));
        }
        info!("✓ 已注册 {} 个模板: {:?}", handlers.len(), {
            let mut slugs: Vec<_> = handlers.keys().collect();
            slugs.sort();
            slugs
        });
        Self { handlers }
    }

    /// 按标识查找模板
    pub fn get(&self, template_id: &str) -> Option<Arc<dyn Template>> {
        self.handlers.get(template_id).cloned()
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.handlers.contains_key(template_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
