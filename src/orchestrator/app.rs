//! 应用装配 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个工作进程的入口，负责资源装配与生命周期管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：连接 Redis、启动浏览器、装配路由器/注册表/各服务
//! 2. **信号处理**：SIGINT / SIGTERM 置位停机标志，消费循环在两次认领之间退出
//! 3. **资源管理**：唯一持有 BrowserEngine，退出时关闭
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个任务的细节，向下委托 QueueConsumer
//! - **显式状态**：路由器的限流账本与冷却都挂在显式对象上，没有全局单例

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::browser::BrowserEngine;
use crate::config::Config;
use crate::infrastructure::{
    FileSessionStore, HttpObjectStorage, ObjectStorage, RedisJobQueue,
};
use crate::orchestrator::job_processor::JobProcessor;
use crate::orchestrator::queue_consumer::QueueConsumer;
use crate::services::{
    BrowserSessionManager, CallbackReporter, HandoffDetector, LlmRouter, ProgressReporter,
    SessionManager, TelemetryLoop,
};
use crate::workflow::TemplateRegistry;

/// 应用主结构
pub struct App {
    engine: Arc<BrowserEngine>,
    consumer: QueueConsumer,
    shutdown: Arc<AtomicBool>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        // 队列连接
        let queue = Arc::new(RedisJobQueue::connect(&config.redis_url, &config.queue_name).await?);

        // 浏览器引擎
        let engine = Arc::new(BrowserEngine::launch().await?);

        // 基础设施
        let storage: Arc<dyn ObjectStorage> = Arc::new(HttpObjectStorage::new(
            &config.storage_endpoint,
            &config.storage_bucket,
        ));
        let session_store = FileSessionStore::new(&config.sessions_dir);

        // 服务装配
        let reporter: Arc<dyn ProgressReporter> = Arc::new(CallbackReporter::new(&config));
        let router = Arc::new(LlmRouter::from_config(&config));
        let handoff = Arc::new(HandoffDetector::new());
        let sessions: Arc<dyn SessionManager> = Arc::new(BrowserSessionManager::new(
            engine.clone(),
            session_store,
            Duration::from_secs(config.navigation_timeout_secs),
        ));
        let telemetry = TelemetryLoop::new(storage.clone(), reporter.clone());

        // 模板注册表（启动时实例化并校验）
        let registry = TemplateRegistry::builtin();

        let processor = JobProcessor::new(
            registry,
            sessions,
            telemetry,
            reporter,
            router,
            handoff,
            storage,
            Duration::from_secs(config.telemetry_interval_secs),
            Duration::from_secs(config.handoff_timeout_secs),
            config.max_task_steps,
        );

        let consumer = QueueConsumer::new(
            queue,
            processor,
            Duration::from_secs(config.poll_timeout_secs),
        );

        Ok(Self {
            engine,
            consumer,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 运行消费循环直到收到停机信号
    pub async fn run(self) -> Result<()> {
        install_signal_handler(self.shutdown.clone());

        self.consumer.run(self.shutdown.clone()).await;

        self.engine.close().await;
        info!("工作进程已停止");
        Ok(())
    }
}

/// 安装 SIGINT / SIGTERM 处理：置位停机标志
fn install_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("SIGTERM 监听注册失败: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("收到停机信号，将在当前任务结束后退出...");
        shutdown.store(true, Ordering::SeqCst);
    });
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 AutomateFlow Worker 启动");
    info!("📡 Redis: {}", config.redis_url);
    info!("📡 控制平面: {}", config.backend_url);
    info!("📋 队列: {}", config.queue_name);
    info!("{}", "=".repeat(60));
}
