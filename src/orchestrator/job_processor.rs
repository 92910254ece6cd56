//! 任务处理器 - 编排层
//!
//! 单个任务的状态机：Queued → Processing → {Completed, Failed}。
//!
//! 固定顺序：
//! 1. 在做任何事情之前先上报一条 "processing" 事件
//! 2. 解析分发目标；既无已注册模板也无任务描述 → 配置错误，
//!    在分配任何浏览器资源之前快速失败
//! 3. 创建会话、启动遥测心跳、运行模板/通用执行器
//! 4. 逃逸出处理逻辑的任何错误在这里接住，上报 Failed + 耗时
//! 5. 每条退出路径都先停心跳（取消并等待）、再持久化 Cookie、再关会话
//!
//! 到达终态的任务总是被确认（由消费循环执行），本引擎不做重试。

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::{WorkerError, WorkerResult};
use crate::infrastructure::ObjectStorage;
use crate::models::{Job, JobPayload, ProgressEvent};
use crate::services::{
    HandoffDetector, LlmRouter, ProgressReporter, SessionManager, TelemetryLoop,
};
use crate::workflow::{TaskExecutor, Template, TemplateCtx, TemplateRegistry};

/// 分发目标
enum Dispatch {
    /// 已注册的模板
    Template(Arc<dyn Template>),
    /// 通用 LLM 规划任务
    Task(String),
}

/// 任务处理器
pub struct JobProcessor {
    registry: TemplateRegistry,
    sessions: Arc<dyn SessionManager>,
    telemetry: TelemetryLoop,
    reporter: Arc<dyn ProgressReporter>,
    router: Arc<LlmRouter>,
    handoff: Arc<HandoffDetector>,
    storage: Arc<dyn ObjectStorage>,
    telemetry_interval: Duration,
    handoff_timeout: Duration,
    max_task_steps: usize,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: TemplateRegistry,
        sessions: Arc<dyn SessionManager>,
        telemetry: TelemetryLoop,
        reporter: Arc<dyn ProgressReporter>,
        router: Arc<LlmRouter>,
        handoff: Arc<HandoffDetector>,
        storage: Arc<dyn ObjectStorage>,
        telemetry_interval: Duration,
        handoff_timeout: Duration,
        max_task_steps: usize,
    ) -> Self {
        Self {
            registry,
            sessions,
            telemetry,
            reporter,
            router,
            handoff,
            storage,
            telemetry_interval,
            handoff_timeout,
            max_task_steps,
        }
    }

    /// 处理一个任务直至终态，返回带终态的任务
    pub async fn process(&self, payload: JobPayload) -> Job {
        let mut job = Job::new(payload);
        let started = tokio::time::Instant::now();

        info!(
            "开始处理任务 {} (template: {:?})",
            job.id(),
            job.payload.template_id
        );
        job.mark_processing();
        self.reporter
            .report(job.id(), ProgressEvent::processing())
            .await;

        // ========== 分发解析（先于任何资源分配）==========
        let dispatch = match self.resolve_dispatch(&job.payload) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                let elapsed = elapsed_ms(started);
                error!("任务 {} 配置错误: {}", job.id(), e);
                job.mark_failed(e.to_string(), elapsed);
                self.reporter
                    .report(job.id(), ProgressEvent::failed(e.to_string(), elapsed))
                    .await;
                return job;
            }
        };

        // ========== 会话 + 遥测 ==========
        let session = match self.sessions.create_context(job.id()).await {
            Ok(session) => session,
            Err(e) => {
                let elapsed = elapsed_ms(started);
                error!("任务 {} 的会话创建失败: {}", job.id(), e);
                job.mark_failed(e.to_string(), elapsed);
                self.reporter
                    .report(job.id(), ProgressEvent::failed(e.to_string(), elapsed))
                    .await;
                return job;
            }
        };

        let telemetry_handle =
            self.telemetry
                .start(session.driver.clone(), job.id(), self.telemetry_interval);

        let ctx = TemplateCtx {
            page: session.driver.clone(),
            reporter: self.reporter.clone(),
            router: self.router.clone(),
            handoff: self.handoff.clone(),
            storage: self.storage.clone(),
            handoff_timeout: self.handoff_timeout,
        };

        let outcome = match dispatch {
            Dispatch::Template(template) => {
                template.run(&job.payload.parameters, job.id(), &ctx).await
            }
            Dispatch::Task(description) => {
                TaskExecutor::new(self.max_task_steps)
                    .run(&description, &job.payload.parameters, job.id(), &ctx)
                    .await
            }
        };

        // ========== 统一的退出路径：先停心跳，再持久化，再关会话 ==========
        telemetry_handle.stop().await;
        self.sessions.persist(&session).await;
        self.sessions.close(session).await;

        let elapsed = elapsed_ms(started);
        match outcome {
            Ok(result) => {
                info!("✅ 任务 {} 完成，耗时 {}ms", job.id(), elapsed);
                job.mark_completed(result.clone(), elapsed);
                self.reporter
                    .report(job.id(), ProgressEvent::completed(result, elapsed))
                    .await;
            }
            Err(e) => {
                error!("❌ 任务 {} 失败: {}", job.id(), e);
                job.mark_failed(e.to_string(), elapsed);
                self.reporter
                    .report(job.id(), ProgressEvent::failed(e.to_string(), elapsed))
                    .await;
            }
        }

        job
    }

    /// 解析分发目标
    ///
    /// 已注册模板优先；未注册的 templateId 退回 taskDescription；
    /// 两者都没有即配置错误。
    fn resolve_dispatch(&self, payload: &JobPayload) -> WorkerResult<Dispatch> {
        if let Some(template_id) = &payload.template_id {
            if let Some(handler) = self.registry.get(template_id) {
                return Ok(Dispatch::Template(handler));
            }
        }
        if let Some(description) = &payload.task_description {
            return Ok(Dispatch::Task(description.clone()));
        }
        Err(WorkerError::configuration(
            "任务既没有可用的 templateId 也没有 taskDescription",
        ))
    }
}

fn elapsed_ms(started: tokio::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
