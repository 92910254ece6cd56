//! 进度回调 - 业务能力层
//!
//! 把部分进度载荷 POST 到控制平面的固定端点。上报是尽力而为的：
//! 非 2xx 响应和传输失败只记日志并吞掉，不重试、不阻塞、不影响
//! 它所描述的任务——任务的最终状态以工作进程本地计算结果为准。

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::ProgressEvent;

/// 进度上报能力
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// 上报一条部分进度事件；永不失败、永不阻塞任务
    async fn report(&self, job_id: &str, event: ProgressEvent);
}

/// 控制平面回调上报器
pub struct CallbackReporter {
    client: reqwest::Client,
    endpoint: String,
    worker_secret: String,
}

impl CallbackReporter {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/webhooks/worker", config.backend_url),
            worker_secret: config.worker_secret.clone(),
        }
    }

    /// 用显式端点创建（测试用）
    pub fn with_endpoint(endpoint: impl Into<String>, worker_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            worker_secret: worker_secret.into(),
        }
    }
}

#[async_trait]
impl ProgressReporter for CallbackReporter {
    async fn report(&self, job_id: &str, event: ProgressEvent) {
        let mut payload = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!("任务 {} 的进度事件序列化失败: {}", job_id, e);
                return;
            }
        };
        payload["jobId"] = json!(job_id);

        let result = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-Worker-Secret", &self.worker_secret)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    "任务 {} 的回调返回非 2xx: {}",
                    job_id,
                    response.status()
                );
            }
            Ok(_) => debug!("✓ 任务 {} 的进度已上报", job_id),
            Err(e) => warn!("任务 {} 的回调发送失败: {}", job_id, e),
        }
    }
}
