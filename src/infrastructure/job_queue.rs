//! 任务队列 - 基础设施层
//!
//! 持久化的列表队列：认领 = 把任务引用从 wait 列表原子迁移到 active 列表，
//! 载荷从每个任务的哈希记录 `data` 字段读取，确认 = 从 active 列表移除一条。
//!
//! 键名沿用入队方的约定：
//! - `bull:{queue}:wait`   - 等待列表
//! - `bull:{queue}:active` - 处理中列表
//! - `bull:{queue}:{id}`   - 任务哈希记录

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use crate::error::WorkerResult;

/// 持久化任务队列能力
///
/// 崩溃的工作进程会在 active 列表中留下孤儿条目，本引擎不做自动回收，
/// 需要外部的对账清扫（已知缺口）。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 认领一个任务：阻塞至多 `timeout`，超时返回 None 以便调用方检查停机标志
    async fn claim(&self, timeout: Duration) -> WorkerResult<Option<String>>;

    /// 读取任务载荷（哈希记录的 data 字段），记录缺失返回 None
    async fn fetch_payload(&self, entry_id: &str) -> WorkerResult<Option<String>>;

    /// 确认任务：从 active 列表移除恰好一条匹配条目
    async fn ack(&self, entry_id: &str) -> WorkerResult<()>;
}

/// 基于 Redis 的队列实现
pub struct RedisJobQueue {
    conn: MultiplexedConnection,
    queue_name: String,
}

impl RedisJobQueue {
    /// 连接 Redis 并创建队列
    pub async fn connect(redis_url: &str, queue_name: &str) -> WorkerResult<Self> {
        info!("正在连接 Redis: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("✓ Redis 连接成功，监听队列: bull:{}:wait", queue_name);
        Ok(Self {
            conn,
            queue_name: queue_name.to_string(),
        })
    }

    fn wait_key(&self) -> String {
        format!("bull:{}:wait", self.queue_name)
    }

    fn active_key(&self) -> String {
        format!("bull:{}:active", self.queue_name)
    }

    fn job_key(&self, entry_id: &str) -> String {
        format!("bull:{}:{}", self.queue_name, entry_id)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn claim(&self, timeout: Duration) -> WorkerResult<Option<String>> {
        let mut conn = self.conn.clone();
        // BRPOPLPUSH：wait → active 的原子迁移，超时返回 nil
        let entry_id: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(self.wait_key())
            .arg(self.active_key())
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        if let Some(ref id) = entry_id {
            debug!("认领任务条目: {}", id);
        }
        Ok(entry_id)
    }

    async fn fetch_payload(&self, entry_id: &str) -> WorkerResult<Option<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.job_key(entry_id))
            .arg("data")
            .query_async(&mut conn)
            .await?;
        Ok(raw)
    }

    async fn ack(&self, entry_id: &str) -> WorkerResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(self.active_key())
            .arg(1)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;
        debug!("确认任务条目 {} (移除 {} 条)", entry_id, removed);
        Ok(())
    }
}
