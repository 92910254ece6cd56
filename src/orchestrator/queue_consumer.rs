//! 队列消费循环 - 编排层
//!
//! 整个工作进程的唯一顶层驱动：认领 → 取载荷 → 处理到终态 → 确认。
//! 任务严格一次一个；认领超时返回空以便检查停机标志。
//!
//! 已知缺口：载荷缺失的条目只记日志跳过、不确认；崩溃进程留在
//! active 列表里的孤儿条目不做自动回收，需要外部对账清扫。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::infrastructure::JobQueue;
use crate::models::JobPayload;
use crate::orchestrator::job_processor::JobProcessor;

/// 队列消费者
pub struct QueueConsumer {
    queue: Arc<dyn JobQueue>,
    processor: JobProcessor,
    poll_timeout: Duration,
}

impl QueueConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, processor: JobProcessor, poll_timeout: Duration) -> Self {
        Self {
            queue,
            processor,
            poll_timeout,
        }
    }

    /// 消费循环：直到停机标志置位
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::SeqCst) {
            let entry_id = match self.queue.claim(self.poll_timeout).await {
                Ok(Some(entry_id)) => entry_id,
                Ok(None) => continue, // 超时：回头检查停机标志
                Err(e) => {
                    error!("队列认领失败: {}", e);
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Err(e) = self.handle_entry(&entry_id).await {
                error!("处理条目 {} 出错: {}", entry_id, e);
                sleep(Duration::from_secs(1)).await;
            }
        }
        info!("消费循环已退出");
    }

    /// 处理一个已认领的条目
    async fn handle_entry(&self, entry_id: &str) -> Result<()> {
        let raw = match self.queue.fetch_payload(entry_id).await? {
            Some(raw) => raw,
            None => {
                // 已知缺口：跳过但不确认，等待外部对账
                warn!("任务条目 {} 没有载荷，跳过（不确认）", entry_id);
                return Ok(());
            }
        };

        let payload: JobPayload = serde_json::from_str(&raw)?;
        info!("出队任务: {}", payload.job_id);

        // 处理到终态；失败的任务同样确认，本引擎不重试
        let job = self.processor.process(payload).await;
        self.queue.ack(entry_id).await?;
        info!("任务 {} 已确认 (状态: {:?})", job.id(), job.status);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerResult;
    use crate::models::JobStatus;
    use crate::services::{HandoffDetector, LlmRouter, TelemetryLoop};
    use crate::testing::{FakePage, FakeSessionManager, MemoryReporter, MemoryStorage};
    use crate::workflow::TemplateRegistry;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// 内存队列：等待/处理中两个列表 + 载荷表
    #[derive(Default)]
    struct FakeQueue {
        waiting: Mutex<VecDeque<String>>,
        active: Mutex<Vec<String>>,
        payloads: Mutex<HashMap<String, String>>,
        acked: Mutex<Vec<String>>,
    }

    impl FakeQueue {
        fn enqueue(&self, entry_id: &str, payload: Option<&str>) {
            self.waiting.lock().unwrap().push_back(entry_id.to_string());
            if let Some(payload) = payload {
                self.payloads
                    .lock()
                    .unwrap()
                    .insert(entry_id.to_string(), payload.to_string());
            }
        }

        fn active_len(&self) -> usize {
            self.active.lock().unwrap().len()
        }

        fn acked(&self) -> Vec<String> {
            self.acked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobQueue for FakeQueue {
        async fn claim(&self, _timeout: Duration) -> WorkerResult<Option<String>> {
            let entry = self.waiting.lock().unwrap().pop_front();
            if let Some(ref id) = entry {
                self.active.lock().unwrap().push(id.clone());
            }
            Ok(entry)
        }

        async fn fetch_payload(&self, entry_id: &str) -> WorkerResult<Option<String>> {
            Ok(self.payloads.lock().unwrap().get(entry_id).cloned())
        }

        async fn ack(&self, entry_id: &str) -> WorkerResult<()> {
            let mut active = self.active.lock().unwrap();
            if let Some(pos) = active.iter().position(|id| id == entry_id) {
                active.remove(pos);
            }
            self.acked.lock().unwrap().push(entry_id.to_string());
            Ok(())
        }
    }

    fn make_consumer(
        queue: Arc<FakeQueue>,
    ) -> (QueueConsumer, Arc<FakeSessionManager>, Arc<MemoryReporter>) {
        let page = Arc::new(FakePage::new());
        let sessions = Arc::new(FakeSessionManager::new(page));
        let reporter = Arc::new(MemoryReporter::new());
        let storage = Arc::new(MemoryStorage::new());
        let processor = JobProcessor::new(
            TemplateRegistry::builtin(),
            sessions.clone(),
            TelemetryLoop::new(storage.clone(), reporter.clone()),
            reporter.clone(),
            Arc::new(LlmRouter::new(Vec::new())),
            Arc::new(HandoffDetector::new()),
            storage,
            Duration::from_secs(3),
            Duration::from_secs(300),
            30,
        );
        (
            QueueConsumer::new(queue, processor, Duration::from_secs(5)),
            sessions,
            reporter,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_claimed_job_processed_and_acked() {
        let queue = Arc::new(FakeQueue::default());
        queue.enqueue(
            "entry-1",
            Some(r#"{"jobId":"job-1","templateId":"screenshot_generator","parameters":{"url":"https://example.com"}}"#),
        );
        let (consumer, _sessions, reporter) = make_consumer(queue.clone());

        consumer.handle_entry("entry-1").await.unwrap();

        assert_eq!(queue.acked(), vec!["entry-1"]);
        assert_eq!(
            reporter.statuses("job-1").last(),
            Some(&JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_missing_payload_skipped_without_ack() {
        let queue = Arc::new(FakeQueue::default());
        queue.enqueue("entry-2", None);
        let (consumer, sessions, _reporter) = make_consumer(queue.clone());

        let claimed = queue.claim(Duration::from_secs(1)).await.unwrap().unwrap();
        consumer.handle_entry(&claimed).await.unwrap();

        // 跳过：不确认、不处理
        assert!(queue.acked().is_empty());
        assert_eq!(queue.active_len(), 1);
        assert_eq!(sessions.created_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_job_is_still_acked() {
        let queue = Arc::new(FakeQueue::default());
        // 既无 templateId 也无 taskDescription → Failed，但仍然确认
        queue.enqueue("entry-3", Some(r#"{"jobId":"job-3"}"#));
        let (consumer, _sessions, reporter) = make_consumer(queue.clone());

        consumer.handle_entry("entry-3").await.unwrap();

        assert_eq!(queue.acked(), vec!["entry-3"]);
        assert_eq!(reporter.statuses("job-3").last(), Some(&JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown_flag() {
        let queue = Arc::new(FakeQueue::default());
        let (consumer, _sessions, _reporter) = make_consumer(queue);

        let shutdown = Arc::new(AtomicBool::new(true));
        // 标志已置位：立即退出
        consumer.run(shutdown).await;
    }
}
