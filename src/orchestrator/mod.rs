//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务的调度与生命周期管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用装配
//! - 管理应用生命周期（初始化、运行、停机）
//! - 装配浏览器引擎、队列、路由器、各服务
//! - 安装信号处理
//!
//! ### `queue_consumer` - 队列消费循环
//! - 唯一的顶层驱动：认领 → 取载荷 → 处理 → 确认
//! - 任务严格一次一个
//! - 超时回头检查停机标志
//!
//! ### `job_processor` - 任务处理器
//! - 单个任务的状态机（Queued → Processing → 终态）
//! - 会话与遥测心跳的生命周期
//! - 终态上报与错误兜底
//!
//! ## 层次关系
//!
//! ```text
//! app (装配 + 生命周期)
//!     ↓
//! queue_consumer (认领/确认循环)
//!     ↓
//! job_processor (单个任务的状态机)
//!     ↓
//! workflow (模板 / 通用执行器)
//!     ↓
//! services (能力层：llm / handoff / session / telemetry / reporter)
//!     ↓
//! infrastructure (基础设施：page / queue / storage / session_store)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：consumer 管循环，processor 管单个任务
//! 2. **资源隔离**：只有编排层持有 BrowserEngine 与队列连接
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度、兜底和统计

pub mod app;
pub mod job_processor;
pub mod queue_consumer;

// 重新导出主要类型
pub use app::App;
pub use job_processor::JobProcessor;
pub use queue_consumer::QueueConsumer;
