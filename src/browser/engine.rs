//! 浏览器引擎
//!
//! 每个工作进程启动一个共享的无头浏览器实例，所有任务从它分配隔离的页面。

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 浏览器引擎
///
/// 职责：
/// - 持有唯一的 Browser 实例与其事件处理任务
/// - 为每个任务分配新页面
/// - 不认识 Job / Session
pub struct BrowserEngine {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl BrowserEngine {
    /// 启动无头浏览器
    pub async fn launch() -> Result<Self> {
        info!("🚀 启动无头浏览器...");

        // 配置无头浏览器
        let config = BrowserConfig::builder()
            .new_headless_mode()
            .args(vec![
                "--no-sandbox", // 容器环境没有用户命名空间，必须禁用沙盒
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage", // 防止共享内存不足
                "--disable-blink-features=AutomationControlled",
                "--disable-infobars",
                "--window-size=1920,1080",
            ])
            .build()
            .map_err(|e| {
                error!("配置无头浏览器失败: {}", e);
                anyhow::anyhow!("配置无头浏览器失败: {}", e)
            })?;

        // 启动浏览器
        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            anyhow::anyhow!("启动无头浏览器失败: {}", e)
        })?;
        debug!("无头浏览器启动成功");

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(tokio::time::Duration::from_millis(300)).await;

        info!("✅ 无头浏览器就绪");

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
        })
    }

    /// 为任务分配一个新页面
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self.browser.lock().await;
        let page = browser.new_page("about:blank").await.map_err(|e| {
            error!("创建页面失败: {}", e);
            anyhow::anyhow!("创建页面失败: {}", e)
        })?;
        Ok(page)
    }

    /// 关闭浏览器并停止事件任务
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            error!("关闭浏览器失败: {}", e);
        }
        self.handler_task.abort();
        info!("浏览器已关闭");
    }
}
