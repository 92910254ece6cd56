//! 遥测心跳 - 业务能力层
//!
//! 每个任务一条独立于主流程调度的后台截图心跳：截取视口截图、上传、
//! 把 URL 上报给控制平面，然后休眠一个间隔，如此往复。单次迭代失败
//! 只记日志并继续下一轮；只有显式取消才能让循环永久停止。
//!
//! 所有者必须在关闭底层会话之前调用 `TelemetryHandle::stop()`——
//! 取消并等待任务结束，保证循环不会触碰已释放的页面。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::{ObjectStorage, PageDriver};
use crate::models::ProgressEvent;
use crate::services::reporter::ProgressReporter;

/// 遥测心跳循环
pub struct TelemetryLoop {
    storage: Arc<dyn ObjectStorage>,
    reporter: Arc<dyn ProgressReporter>,
}

/// 运行中心跳的句柄
///
/// 通过显式取消令牌停止，并在 `stop()` 中等待任务真正结束，
/// 不依赖运行时隐式的任务取消传播。
pub struct TelemetryHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TelemetryHandle {
    /// 取消心跳并等待其终止
    ///
    /// 返回之后保证不会再有任何截图上传发生。
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!("遥测任务结束异常: {}", e);
            }
        }
    }
}

impl TelemetryLoop {
    pub fn new(storage: Arc<dyn ObjectStorage>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { storage, reporter }
    }

    /// 启动后台心跳
    pub fn start(
        &self,
        page: Arc<dyn PageDriver>,
        job_id: &str,
        interval: Duration,
    ) -> TelemetryHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let storage = self.storage.clone();
        let reporter = self.reporter.clone();
        let job_id = job_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = Self::iteration(&page, &job_id, &storage, &reporter) => {}
                }
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("任务 {} 的遥测心跳已停止", job_id);
        });

        TelemetryHandle { token, task }
    }

    /// 单次心跳迭代：截图 → 上传 → 上报；任何失败只记日志
    async fn iteration(
        page: &Arc<dyn PageDriver>,
        job_id: &str,
        storage: &Arc<dyn ObjectStorage>,
        reporter: &Arc<dyn ProgressReporter>,
    ) {
        let bytes = match page.screenshot(false).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("任务 {} 的遥测截图失败: {}", job_id, e);
                return;
            }
        };

        let url = match storage.upload_screenshot(&bytes, job_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!("任务 {} 的遥测截图上传失败: {}", job_id, e);
                return;
            }
        };

        reporter.report(job_id, ProgressEvent::screenshot(url)).await;
    }
}
