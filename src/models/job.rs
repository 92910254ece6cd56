//! 任务数据模型
//!
//! `JobPayload` 是队列中每个任务哈希记录 `data` 字段的 JSON 形态；
//! `Job` 是工作进程内部的状态机载体（Queued → Processing → Completed/Failed）。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 任务状态
///
/// 状态机：Queued → Processing → {Completed, Failed}，到达终态后不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 队列中任务载荷的 JSON 形态
///
/// 由外部入队方创建；`templateId` 与 `taskDescription` 至少应存在其一，
/// 两者都缺失时由任务处理器报配置错误（不分配浏览器资源）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_id: String,
    #[serde(default, alias = "templateSlug", skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default = "default_parameters")]
    pub parameters: JsonValue,
}

fn default_parameters() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

/// 工作进程内部的任务状态机
#[derive(Debug, Clone)]
pub struct Job {
    pub payload: JobPayload,
    pub status: JobStatus,
    pub started_at: DateTime<Local>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub elapsed_ms: Option<u64>,
}

impl Job {
    /// 从队列载荷创建任务（初始状态 Queued）
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            status: JobStatus::Queued,
            started_at: Local::now(),
            result: None,
            error: None,
            elapsed_ms: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.payload.job_id
    }

    /// 进入 Processing 状态（仅允许从 Queued 迁移）
    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
        }
    }

    /// 进入 Completed 终态（到达终态后忽略后续迁移）
    pub fn mark_completed(&mut self, result: JsonValue, elapsed_ms: u64) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Completed;
            self.result = Some(result);
            self.elapsed_ms = Some(elapsed_ms);
        }
    }

    /// 进入 Failed 终态（到达终态后忽略后续迁移）
    pub fn mark_failed(&mut self, error: impl Into<String>, elapsed_ms: u64) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Failed;
            self.error = Some(error.into());
            self.elapsed_ms = Some(elapsed_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_parses_camel_case() {
        let raw = r#"{"jobId":"job-1","templateId":"screenshot_generator","parameters":{"url":"https://example.com"}}"#;
        let payload: JobPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.job_id, "job-1");
        assert_eq!(payload.template_id.as_deref(), Some("screenshot_generator"));
        assert!(payload.task_description.is_none());
        assert_eq!(payload.parameters["url"], json!("https://example.com"));
    }

    #[test]
    fn test_payload_accepts_legacy_template_slug() {
        // 旧版入队方使用 templateSlug 字段
        let raw = r#"{"jobId":"job-2","templateSlug":"form_filler"}"#;
        let payload: JobPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.template_id.as_deref(), Some("form_filler"));
        assert!(payload.parameters.is_object());
    }

    #[test]
    fn test_status_terminal_once() {
        let payload: JobPayload = serde_json::from_str(r#"{"jobId":"job-3"}"#).unwrap();
        let mut job = Job::new(payload);

        job.mark_processing();
        assert_eq!(job.status, JobStatus::Processing);

        job.mark_failed("boom", 12);
        assert_eq!(job.status, JobStatus::Failed);

        // 终态之后的迁移被忽略
        job.mark_completed(json!({"ok": true}), 99);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.elapsed_ms, Some(12));
    }
}
