//! 会话管理 - 业务能力层
//!
//! 从共享浏览器实例为每个任务分配隔离的上下文：随机化身份（User-Agent、
//! 视口，固定语言区域/时区）、注入反检测脚本、尽力恢复该任务的 Cookie
//! 快照。快照缺失不是错误；保存失败只记日志，丢失会话连续性不致命。
//!
//! 不变量：每个任务最多一个活动会话；会话在任务的每条退出路径上都被关闭。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use tracing::{debug, info, warn};

use crate::browser::BrowserEngine;
use crate::error::{WorkerError, WorkerResult};
use crate::infrastructure::{CdpPageDriver, FileSessionStore, PageDriver};
use crate::utils::identity::{BrowserIdentity, LOCALE, STEALTH_SCRIPT, TIMEZONE};

/// 一个任务的浏览器会话
pub struct BrowsingSession {
    pub job_id: String,
    pub driver: Arc<dyn PageDriver>,
}

/// 会话管理能力
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// 为任务创建隔离的浏览器上下文
    async fn create_context(&self, job_id: &str) -> WorkerResult<BrowsingSession>;

    /// 把会话 Cookie 写回持久化快照（尽力而为）
    async fn persist(&self, session: &BrowsingSession);

    /// 关闭会话（所有退出路径都必须经过这里）
    async fn close(&self, session: BrowsingSession);
}

/// 基于共享浏览器引擎的会话管理器
pub struct BrowserSessionManager {
    engine: Arc<BrowserEngine>,
    store: FileSessionStore,
    navigation_timeout: Duration,
}

impl BrowserSessionManager {
    pub fn new(
        engine: Arc<BrowserEngine>,
        store: FileSessionStore,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl SessionManager for BrowserSessionManager {
    async fn create_context(&self, job_id: &str) -> WorkerResult<BrowsingSession> {
        let page = self
            .engine
            .new_page()
            .await
            .map_err(|e| WorkerError::browser("context", e))?;

        // 随机化身份
        let identity = BrowserIdentity::random();
        debug!(
            "任务 {} 分配身份: {}x{}",
            job_id, identity.viewport_width, identity.viewport_height
        );

        page.execute(SetUserAgentOverrideParams::new(identity.user_agent))
            .await
            .map_err(|e| WorkerError::browser("context", e))?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            identity.viewport_width as i64,
            identity.viewport_height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(|e| WorkerError::browser("context", e))?;
        page.execute(SetTimezoneOverrideParams::new(TIMEZONE))
            .await
            .map_err(|e| WorkerError::browser("context", e))?;
        page.execute(SetLocaleOverrideParams::builder().locale(LOCALE).build())
            .await
            .map_err(|e| WorkerError::browser("context", e))?;

        // 注入反检测脚本
        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            warn!("任务 {} 的反检测脚本注入失败: {}", job_id, e);
        }

        let driver: Arc<dyn PageDriver> =
            Arc::new(CdpPageDriver::new(page, self.navigation_timeout));

        // 尽力恢复 Cookie 快照（缺失不是错误）
        if let Some(cookies) = self.store.load(job_id).await {
            if let Err(e) = driver.set_cookies(cookies).await {
                warn!("任务 {} 的 Cookie 恢复失败: {}", job_id, e);
            }
        }

        info!("✓ 任务 {} 的浏览器会话已创建", job_id);
        Ok(BrowsingSession {
            job_id: job_id.to_string(),
            driver,
        })
    }

    async fn persist(&self, session: &BrowsingSession) {
        match session.driver.cookies().await {
            Ok(cookies) => self.store.save(&session.job_id, &cookies).await,
            Err(e) => warn!("任务 {} 的 Cookie 读取失败: {}", session.job_id, e),
        }
    }

    async fn close(&self, session: BrowsingSession) {
        if let Err(e) = session.driver.close().await {
            warn!("任务 {} 的会话关闭失败: {}", session.job_id, e);
        } else {
            debug!("任务 {} 的会话已关闭", session.job_id);
        }
    }
}
