//! 单元测试共享的测试替身
//!
//! 基础设施能力（页面 / 存储 / 上报 / 会话）的可编程假实现，
//! 供各层的 #[cfg(test)] 模块复用。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{WorkerError, WorkerResult};
use crate::infrastructure::{ElementProbe, ObjectStorage, PageDriver};
use crate::models::{JobStatus, ProgressEvent};
use crate::services::reporter::ProgressReporter;
use crate::services::session::{BrowsingSession, SessionManager};

// ========== 假页面 ==========

/// 可编程的假页面
#[derive(Default)]
pub struct FakePage {
    probes: Mutex<HashMap<String, ElementProbe>>,
    text: Mutex<String>,
    html: Mutex<String>,
    texts_of: Mutex<HashMap<String, String>>,
    fillable: Mutex<HashSet<String>>,
    clickable: Mutex<HashSet<String>>,
    eval_responses: Mutex<VecDeque<JsonValue>>,
    cookies: Mutex<JsonValue>,
    pub navigations: Mutex<Vec<String>>,
    pub fills: Mutex<Vec<(String, String)>>,
    pub clicks: Mutex<Vec<String>>,
    pub viewports: Mutex<Vec<(u32, u32)>>,
    screenshot_count: AtomicUsize,
    screenshot_failures: AtomicUsize,
    fail_navigation: AtomicBool,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            cookies: Mutex::new(JsonValue::Array(Vec::new())),
            ..Default::default()
        }
    }

    pub fn set_probe(&self, selector: &str, found: bool, visible: bool) {
        self.probes
            .lock()
            .unwrap()
            .insert(selector.to_string(), ElementProbe { found, visible });
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    pub fn set_html(&self, html: &str) {
        *self.html.lock().unwrap() = html.to_string();
    }

    pub fn set_text_of(&self, selector: &str, text: &str) {
        self.texts_of
            .lock()
            .unwrap()
            .insert(selector.to_string(), text.to_string());
    }

    /// 注册可成功填写的选择器（探测结果同时标记为可见）
    pub fn allow_fill(&self, selector: &str) {
        self.fillable.lock().unwrap().insert(selector.to_string());
        self.set_probe(selector, true, true);
    }

    pub fn allow_click(&self, selector: &str) {
        self.clickable.lock().unwrap().insert(selector.to_string());
        self.set_probe(selector, true, true);
    }

    pub fn push_eval_response(&self, value: JsonValue) {
        self.eval_responses.lock().unwrap().push_back(value);
    }

    /// 令接下来的 n 次截图失败
    pub fn fail_screenshots(&self, n: usize) {
        self.screenshot_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_navigation(&self) {
        self.fail_navigation.store(true, Ordering::SeqCst);
    }

    pub fn screenshot_count(&self) -> usize {
        self.screenshot_count.load(Ordering::SeqCst)
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> WorkerResult<()> {
        if self.fail_navigation.load(Ordering::SeqCst) {
            return Err(WorkerError::browser("navigate", format!("导航失败: {}", url)));
        }
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> WorkerResult<String> {
        Ok(self
            .navigations
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn content(&self) -> WorkerResult<String> {
        Ok(self.html.lock().unwrap().clone())
    }

    async fn visible_text(&self) -> WorkerResult<String> {
        Ok(self.text.lock().unwrap().clone())
    }

    async fn probe(&self, selector: &str) -> WorkerResult<ElementProbe> {
        Ok(self
            .probes
            .lock()
            .unwrap()
            .get(selector)
            .copied()
            .unwrap_or(ElementProbe::ABSENT))
    }

    async fn fill(&self, selector: &str, value: &str) -> WorkerResult<bool> {
        if self.fillable.lock().unwrap().contains(selector) {
            self.fills
                .lock()
                .unwrap()
                .push((selector.to_string(), value.to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn click(&self, selector: &str) -> WorkerResult<bool> {
        if self.clickable.lock().unwrap().contains(selector) {
            self.clicks.lock().unwrap().push(selector.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> WorkerResult<bool> {
        self.fill(selector, value).await
    }

    async fn text_of(&self, selector: &str) -> WorkerResult<Option<String>> {
        Ok(self.texts_of.lock().unwrap().get(selector).cloned())
    }

    async fn screenshot(&self, _full_page: bool) -> WorkerResult<Vec<u8>> {
        let remaining = self.screenshot_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.screenshot_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WorkerError::browser("screenshot", "截图失败"));
        }
        self.screenshot_count.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn set_viewport(&self, width: u32, height: u32) -> WorkerResult<()> {
        self.viewports.lock().unwrap().push((width, height));
        Ok(())
    }

    async fn cookies(&self) -> WorkerResult<JsonValue> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn set_cookies(&self, cookies: JsonValue) -> WorkerResult<()> {
        *self.cookies.lock().unwrap() = cookies;
        Ok(())
    }

    async fn eval(&self, _js_code: String) -> WorkerResult<JsonValue> {
        Ok(self
            .eval_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JsonValue::Null))
    }

    async fn close(&self) -> WorkerResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ========== 内存存储 ==========

/// 记录上传的内存对象存储
#[derive(Default)]
pub struct MemoryStorage {
    uploads: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload_screenshot(&self, _bytes: &[u8], job_id: &str) -> WorkerResult<String> {
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!("mem://screenshots/{}/{}.png", job_id, uploads.len());
        uploads.push(url.clone());
        Ok(url)
    }

    async fn upload_file(
        &self,
        _bytes: &[u8],
        job_id: &str,
        filename: &str,
        _content_type: &str,
    ) -> WorkerResult<String> {
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!("mem://results/{}/{}-{}", job_id, uploads.len(), filename);
        uploads.push(url.clone());
        Ok(url)
    }
}

// ========== 内存上报器 ==========

/// 记录事件流的内存上报器
#[derive(Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<(String, ProgressEvent)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// 按到达顺序返回某任务的状态事件
    pub fn statuses(&self, job_id: &str) -> Vec<JobStatus> {
        self.events_for(job_id)
            .into_iter()
            .filter_map(|e| e.status)
            .collect()
    }

    pub fn screenshot_events(&self, job_id: &str) -> Vec<String> {
        self.events_for(job_id)
            .into_iter()
            .flat_map(|e| e.screenshots)
            .collect()
    }

    pub fn logs(&self, job_id: &str) -> Vec<String> {
        self.events_for(job_id)
            .into_iter()
            .flat_map(|e| e.logs)
            .collect()
    }
}

#[async_trait]
impl ProgressReporter for MemoryReporter {
    async fn report(&self, job_id: &str, event: ProgressEvent) {
        self.events.lock().unwrap().push((job_id.to_string(), event));
    }
}

// ========== 假会话管理器 ==========

/// 基于假页面的会话管理器
pub struct FakeSessionManager {
    page: Arc<FakePage>,
    fail_create: AtomicBool,
    pub created: AtomicUsize,
    pub persisted: AtomicUsize,
    pub closed: AtomicUsize,
}

impl FakeSessionManager {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            fail_create: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            persisted: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionManager for FakeSessionManager {
    async fn create_context(&self, job_id: &str) -> WorkerResult<BrowsingSession> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(WorkerError::browser("context", "会话创建失败"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(BrowsingSession {
            job_id: job_id.to_string(),
            driver: self.page.clone(),
        })
    }

    async fn persist(&self, _session: &BrowsingSession) {
        self.persisted.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self, _session: BrowsingSession) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
