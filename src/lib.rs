//! # AutomateFlow Worker
//!
//! 从持久化队列拉取浏览器自动化任务的工作进程：驱动浏览器完成任务
//! （抓取、填表、价格监控、截图、下载文档），必要时请求 LLM 解析
//! 模糊的页面结构，并把进度流式上报给控制平面。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `PageDriver` - 浏览器页面能力（CDP 实现）
//! - `JobQueue` - 持久化队列的认领/载荷/确认
//! - `ObjectStorage` - 对象存储上传
//! - `FileSessionStore` - 每任务 Cookie 快照
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个任务范围内的能力
//! - `LlmRouter` - 多提供商故障转移（滑动窗口限流 + 全局冷却）
//! - `HandoffDetector` - CAPTCHA / OTP 启发式检测
//! - `SessionManager` - 会话创建与 Cookie 持久化
//! - `TelemetryLoop` - 后台截图心跳
//! - `CallbackReporter` - 控制平面进度回调
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `Template` + 静态注册表 - 五个内置模板
//! - `TaskExecutor` - 自然语言任务的 LLM 规划循环
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 资源装配与生命周期
//! - `orchestrator/queue_consumer` - 认领/确认循环（唯一顶层驱动）
//! - `orchestrator/job_processor` - 单个任务的状态机
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub mod testing;

// 重新导出常用类型
pub use browser::BrowserEngine;
pub use config::Config;
pub use error::{WorkerError, WorkerResult};
pub use infrastructure::{JobQueue, ObjectStorage, PageDriver};
pub use models::{Job, JobPayload, JobStatus, ProgressEvent};
pub use orchestrator::{App, JobProcessor, QueueConsumer};
pub use services::{HandoffDetector, LlmRouter, SessionManager, TelemetryLoop};
pub use workflow::{Template, TemplateRegistry};
