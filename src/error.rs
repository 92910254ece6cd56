//! 错误类型定义
//!
//! 按照失败的恢复策略划分错误类别：
//! - `Configuration` - 任务缺少必要字段，在分配任何浏览器资源之前快速失败
//! - `Provider` - 单个 LLM 提供商调用失败，由路由器切换下一个提供商恢复
//! - `ProvidersExhausted` - 所有提供商均不可用，触发全局冷却并上抛
//! - `BrowserOperation` - 单步浏览器操作失败，按步骤隔离（核心导航除外）
//! - `JobExecution` - 模板/任务逻辑中未捕获的错误，任务终态为 Failed

use thiserror::Error;

/// 工作进程错误类型
#[derive(Debug, Error)]
pub enum WorkerError {
    /// 配置错误（任务缺少 templateId 和 taskDescription 等）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 单个 LLM 提供商调用失败
    #[error("LLM 提供商调用失败 ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// 所有 LLM 提供商均不可用
    #[error("所有 LLM 提供商均已耗尽，进入 {cooldown_secs} 秒冷却期")]
    ProvidersExhausted { cooldown_secs: u64 },

    /// 浏览器操作失败
    #[error("浏览器操作失败 ({step}): {message}")]
    BrowserOperation { step: String, message: String },

    /// 任务执行失败（模板/任务逻辑中未捕获的错误）
    #[error("任务执行失败: {0}")]
    JobExecution(String),

    /// 队列操作失败
    #[error("队列操作失败: {0}")]
    Queue(String),

    /// 对象存储上传失败
    #[error("对象存储上传失败: {0}")]
    Storage(String),
}

// ========== 便捷构造函数 ==========

impl WorkerError {
    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        WorkerError::Configuration(message.into())
    }

    /// 创建提供商调用错误
    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        WorkerError::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// 创建浏览器操作错误
    pub fn browser(step: impl Into<String>, message: impl ToString) -> Self {
        WorkerError::BrowserOperation {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// 判断是否为核心导航错误（对任务而言是终态）
    pub fn is_navigation(&self) -> bool {
        matches!(self, WorkerError::BrowserOperation { step, .. } if step == "navigate")
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for WorkerError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        WorkerError::BrowserOperation {
            step: "cdp".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for WorkerError {
    fn from(err: redis::RedisError) -> Self {
        WorkerError::Queue(err.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::JobExecution(format!("JSON 解析失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 工作进程结果类型
pub type WorkerResult<T> = Result<T, WorkerError>;
