/// 工作进程配置
#[derive(Clone, Debug)]
pub struct Config {
    /// Redis 连接地址
    pub redis_url: String,
    /// 控制平面后端地址
    pub backend_url: String,
    /// 回调鉴权密钥（X-Worker-Secret 请求头）
    pub worker_secret: String,
    /// 队列名称
    pub queue_name: String,
    /// 队列轮询超时（秒）
    pub poll_timeout_secs: u64,
    /// 遥测截图心跳间隔（秒）
    pub telemetry_interval_secs: u64,
    /// Cookie 快照存放目录
    pub sessions_dir: String,
    /// 页面导航超时（秒）
    pub navigation_timeout_secs: u64,
    /// 人工接管等待超时（秒）
    pub handoff_timeout_secs: u64,
    /// 通用任务执行器的最大步数
    pub max_task_steps: usize,
    // --- 对象存储配置 ---
    pub storage_endpoint: String,
    pub storage_bucket: String,
    // --- LLM 提供商配置（密钥为空则不注册该提供商）---
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub openrouter_api_key: String,
    pub cerebras_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            backend_url: "http://localhost:3000".to_string(),
            worker_secret: String::new(),
            queue_name: "automation-jobs".to_string(),
            poll_timeout_secs: 5,
            telemetry_interval_secs: 3,
            sessions_dir: "/tmp/automateflow_sessions".to_string(),
            navigation_timeout_secs: 30,
            handoff_timeout_secs: 300,
            max_task_steps: 30,
            storage_endpoint: String::new(),
            storage_bucket: "automateflow-files".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            openrouter_api_key: String::new(),
            cerebras_api_key: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(default.redis_url),
            backend_url: std::env::var("BACKEND_URL").unwrap_or(default.backend_url),
            worker_secret: std::env::var("WORKER_SECRET").unwrap_or(default.worker_secret),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or(default.queue_name),
            poll_timeout_secs: std::env::var("POLL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_timeout_secs),
            telemetry_interval_secs: std::env::var("TELEMETRY_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.telemetry_interval_secs),
            sessions_dir: std::env::var("SESSIONS_DIR").unwrap_or(default.sessions_dir),
            navigation_timeout_secs: std::env::var("NAVIGATION_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.navigation_timeout_secs),
            handoff_timeout_secs: std::env::var("HANDOFF_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.handoff_timeout_secs),
            max_task_steps: std::env::var("MAX_TASK_STEPS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_task_steps),
            storage_endpoint: std::env::var("STORAGE_ENDPOINT").unwrap_or(default.storage_endpoint),
            storage_bucket: std::env::var("STORAGE_BUCKET").unwrap_or(default.storage_bucket),
            gemini_api_key: std::env::var("GOOGLE_AI_STUDIO_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .unwrap_or(default.gemini_api_key),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(default.gemini_model),
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or(default.openrouter_api_key),
            cerebras_api_key: std::env::var("CEREBRAS_API_KEY").unwrap_or(default.cerebras_api_key),
        }
    }
}
