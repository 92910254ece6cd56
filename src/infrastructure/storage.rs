//! 对象存储 - 基础设施层
//!
//! 只暴露"上传并返回公开 URL"的能力；公开 URL 即 `{endpoint}/{bucket}/{key}`。
//! 键名约定：截图 `screenshots/{jobId}/{uuid}.png`，结果文件 `results/{jobId}/{uuid}.{ext}`。

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

/// 对象存储能力
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 上传一张 PNG 截图，返回公开 URL
    async fn upload_screenshot(&self, bytes: &[u8], job_id: &str) -> WorkerResult<String>;

    /// 上传一个结果文件，返回公开 URL
    async fn upload_file(
        &self,
        bytes: &[u8],
        job_id: &str,
        filename: &str,
        content_type: &str,
    ) -> WorkerResult<String>;
}

/// 基于 HTTP put-object 的存储实现
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStorage {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> WorkerResult<String> {
        let url = self.public_url(key);
        debug!("上传对象: {} ({} 字节)", key, bytes.len());

        let response = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| WorkerError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::Storage(format!(
                "上传失败 ({}): {}",
                response.status(),
                key
            )));
        }

        info!("✓ 上传完成: {}", url);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload_screenshot(&self, bytes: &[u8], job_id: &str) -> WorkerResult<String> {
        let key = format!("screenshots/{}/{}.png", job_id, Uuid::new_v4());
        self.put_object(&key, bytes, "image/png").await
    }

    async fn upload_file(
        &self,
        bytes: &[u8],
        job_id: &str,
        filename: &str,
        content_type: &str,
    ) -> WorkerResult<String> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("bin");
        let key = format!("results/{}/{}.{}", job_id, Uuid::new_v4(), ext);
        self.put_object(&key, bytes, content_type).await
    }
}
