//! 业务能力层（Services Layer）
//!
//! 每个服务描述"我能做什么"，只处理单个任务范围内的能力，不关心流程顺序：
//!
//! - `providers` / `llm_router` - 多提供商 LLM 路由（限流 + 故障转移 + 冷却）
//! - `handoff` - CAPTCHA / OTP 的启发式检测与人工接管等待
//! - `session` - 浏览器会话的创建、Cookie 持久化与关闭
//! - `telemetry` - 每任务的后台截图心跳
//! - `reporter` - 控制平面进度回调

pub mod handoff;
pub mod llm_router;
pub mod providers;
pub mod reporter;
pub mod session;
pub mod telemetry;

pub use handoff::{HandoffDetector, HandoffResolver};
pub use llm_router::{LlmRouter, ProviderLedger, RouterState};
pub use providers::LlmProvider;
pub use reporter::{CallbackReporter, ProgressReporter};
pub use session::{BrowserSessionManager, BrowsingSession, SessionManager};
pub use telemetry::{TelemetryHandle, TelemetryLoop};
