//! 会话存储 - 基础设施层
//!
//! 每个任务一份 Cookie 快照（JSON 数组），按 jobId 存为独立文件。
//! 快照缺失不是错误；读写失败只记日志，不影响任务。

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// 基于文件的 Cookie 快照存储
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, job_id: &str) -> PathBuf {
        // jobId 来自外部，做一次保守的文件名清洗
        let safe: String = job_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}_cookies.json", safe))
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// 读取快照，缺失返回 None
    pub async fn load(&self, job_id: &str) -> Option<JsonValue> {
        let path = self.snapshot_path(job_id);
        if !Path::new(&path).exists() {
            return None;
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<JsonValue>(&raw) {
                Ok(cookies) => {
                    let count = cookies.as_array().map(|a| a.len()).unwrap_or(0);
                    debug!("已加载任务 {} 的会话快照: {} 条 Cookie", job_id, count);
                    Some(cookies)
                }
                Err(e) => {
                    warn!("任务 {} 的会话快照解析失败: {}", job_id, e);
                    None
                }
            },
            Err(e) => {
                warn!("任务 {} 的会话快照读取失败: {}", job_id, e);
                None
            }
        }
    }

    /// 覆盖写入快照；失败只记日志
    pub async fn save(&self, job_id: &str, cookies: &JsonValue) {
        if let Err(e) = self.ensure_dir().await {
            warn!("会话目录创建失败: {}", e);
            return;
        }

        let path = self.snapshot_path(job_id);
        let raw = match serde_json::to_string(cookies) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("任务 {} 的会话快照序列化失败: {}", job_id, e);
                return;
            }
        };

        match tokio::fs::write(&path, raw).await {
            Ok(()) => {
                let count = cookies.as_array().map(|a| a.len()).unwrap_or(0);
                debug!("已保存任务 {} 的会话快照: {} 条 Cookie", job_id, count);
            }
            Err(e) => warn!("任务 {} 的会话快照写入失败: {}", job_id, e),
        }
    }

    /// 清除快照
    pub async fn clear(&self, job_id: &str) {
        let path = self.snapshot_path(job_id);
        if Path::new(&path).exists() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("任务 {} 的会话快照删除失败: {}", job_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let store = FileSessionStore::new(std::env::temp_dir().join("af_sessions_test_missing"));
        assert!(store.load("no-such-job").await.is_none());
    }

    #[tokio::test]
    async fn test_save_load_clear_roundtrip() {
        let store = FileSessionStore::new(std::env::temp_dir().join("af_sessions_test_rw"));
        let cookies = json!([{"name": "sid", "value": "abc", "domain": ".example.com"}]);

        store.save("job-rw", &cookies).await;
        let loaded = store.load("job-rw").await.unwrap();
        assert_eq!(loaded, cookies);

        store.clear("job-rw").await;
        assert!(store.load("job-rw").await.is_none());
    }
}
