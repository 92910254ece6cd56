//! 进度事件与人工接管报告
//!
//! `ProgressEvent` 是发往控制平面的部分进度载荷（仅追加，字段全部可选）。
//! 事件只在各自来源内部有序：任务逻辑的事件流与遥测心跳的事件流相互交织，
//! 消费方应将其视为按到达顺序排列的流，而非带序号的日志。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::job::JobStatus;

/// 人工接管类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffKind {
    Captcha,
    Otp,
}

/// 人工接管报告（每次检测调用临时产生）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffReport {
    pub kind: HandoffKind,
    /// 命中的规则（选择器或文本模式）
    pub rule: String,
}

/// 发往控制平面的部分进度载荷
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub screenshots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "executionTime", skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ProgressEvent {
    /// 单条日志事件
    pub fn log(message: impl Into<String>) -> Self {
        Self {
            logs: vec![message.into()],
            ..Default::default()
        }
    }

    /// 单张截图事件
    pub fn screenshot(url: impl Into<String>) -> Self {
        Self {
            screenshots: vec![url.into()],
            ..Default::default()
        }
    }

    /// 进入 Processing 状态的事件
    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            logs: vec!["Job started".to_string()],
            ..Default::default()
        }
    }

    /// 任务完成事件
    pub fn completed(result: JsonValue, elapsed_ms: u64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result: Some(result),
            execution_time_ms: Some(elapsed_ms),
            logs: vec!["Job completed successfully".to_string()],
            ..Default::default()
        }
    }

    /// 任务失败事件
    pub fn failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Failed),
            logs: vec![format!("Job failed: {}", error)],
            error: Some(error),
            execution_time_ms: Some(elapsed_ms),
            ..Default::default()
        }
    }

    /// 人工接管事件
    pub fn handoff(report: HandoffReport) -> Self {
        Self {
            handoff: Some(report),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_partial_fields() {
        let event = ProgressEvent::log("Navigating...");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"logs": ["Navigating..."]}));
    }

    #[test]
    fn test_terminal_event_wire_format() {
        let event = ProgressEvent::completed(json!({"price": 9.99}), 1234);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], json!("completed"));
        assert_eq!(value["executionTime"], json!(1234));
        assert_eq!(value["result"]["price"], json!(9.99));
    }

    #[test]
    fn test_handoff_wire_format() {
        let event = ProgressEvent::handoff(HandoffReport {
            kind: HandoffKind::Captcha,
            rule: "iframe[src*=\"recaptcha\"]".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["handoff"]["kind"], json!("captcha"));
    }
}
