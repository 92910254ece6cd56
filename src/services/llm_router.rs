//! LLM 路由器 - 业务能力层
//!
//! 按固定优先级在多个提供商之间做故障转移：
//!
//! 1. 若全局冷却未过期，先挂起等待剩余时长
//! 2. 按优先级遍历提供商，跳过不满足视觉要求的、跳过滑动窗口已满的
//! 3. 第一个合格者记一笔账本后调用；非空成功响应立即返回
//! 4. 单个提供商失败或返回空只记日志并前进，不算整次调用失败
//! 5. 无合格提供商或全部失败：设置 60 秒全局冷却，返回 ProvidersExhausted
//!
//! 排序是固定策略（视觉能力强、配额宽裕的在前），先到先得，不做负载均衡。
//! 账本与冷却都是进程内状态，跨进程不共享（提供商服务端另有硬限制兜底）。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{WorkerError, WorkerResult};
use crate::services::providers::{
    CerebrasProvider, GeminiProvider, LlmProvider, OpenRouterProvider,
};

/// 滑动窗口长度
const RATE_WINDOW: Duration = Duration::from_secs(60);
/// 全局冷却时长
const COOLDOWN: Duration = Duration::from_secs(60);

/// 单个提供商的限流账本
///
/// 只保留落在最近 60 秒窗口内的时间戳；任意 60 秒窗口内的
/// 记录数不会超过上限。
pub struct ProviderLedger {
    ceiling: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl ProviderLedger {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// 尝试记录一次调用；窗口已满时返回 false 且不记录
    pub fn try_record(&self, now: Instant) -> bool {
        let mut timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() as u32 >= self.ceiling {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// 当前窗口内的记录数
    pub fn in_window(&self, now: Instant) -> usize {
        let timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
        timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < RATE_WINDOW)
            .count()
    }
}

/// 路由器的进程级长生命周期状态（显式对象，无隐藏单例）
pub struct RouterState {
    cooldown_until: Mutex<Option<Instant>>,
}

impl RouterState {
    pub fn new() -> Self {
        Self {
            cooldown_until: Mutex::new(None),
        }
    }

    /// 当前剩余冷却时长
    fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        let until = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        until.and_then(|t| t.checked_duration_since(now)).filter(|d| !d.is_zero())
    }

    /// 触发冷却；冷却时间戳单调不减
    fn trigger_cooldown(&self, now: Instant) {
        let mut until = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        let new_until = now + COOLDOWN;
        match *until {
            Some(existing) if existing >= new_until => {}
            _ => *until = Some(new_until),
        }
    }
}

impl Default for RouterState {
    fn default() -> Self {
        Self::new()
    }
}

struct ProviderEntry {
    provider: Arc<dyn LlmProvider>,
    ledger: ProviderLedger,
}

/// 多提供商 LLM 路由器
pub struct LlmRouter {
    entries: Vec<ProviderEntry>,
    state: RouterState,
}

impl LlmRouter {
    /// 用给定的提供商列表（按优先级排列）创建路由器
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        let entries = providers
            .into_iter()
            .map(|provider| {
                let ledger = ProviderLedger::new(provider.rate_ceiling());
                ProviderEntry { provider, ledger }
            })
            .collect();
        Self {
            entries,
            state: RouterState::new(),
        }
    }

    /// 按配置注册提供商（密钥为空的不注册），顺序即优先级
    pub fn from_config(config: &Config) -> Self {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        if !config.gemini_api_key.is_empty() {
            info!("注册 LLM 提供商: gemini ({})", config.gemini_model);
            providers.push(Arc::new(GeminiProvider::new(
                &config.gemini_api_key,
                &config.gemini_model,
            )));
        }
        if !config.openrouter_api_key.is_empty() {
            info!("注册 LLM 提供商: openrouter");
            providers.push(Arc::new(OpenRouterProvider::new(&config.openrouter_api_key)));
        }
        if !config.cerebras_api_key.is_empty() {
            info!("注册 LLM 提供商: cerebras");
            providers.push(Arc::new(CerebrasProvider::new(&config.cerebras_api_key)));
        }

        if providers.is_empty() {
            warn!("⚠️ 未配置任何 LLM 提供商，需要 LLM 的任务将全部失败");
        }

        Self::new(providers)
    }

    /// 已注册的提供商数量
    pub fn provider_count(&self) -> usize {
        self.entries.len()
    }

    /// 生成文本
    ///
    /// # 参数
    /// - `prompt`: 提示词
    /// - `image_base64`: PNG 截图的 base64 编码（可选）
    /// - `require_vision`: 是否只允许视觉提供商
    ///
    /// # 返回
    /// 第一个成功提供商的非空响应；全部不可用时返回
    /// `WorkerError::ProvidersExhausted` 并触发全局冷却
    pub async fn generate(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
        require_vision: bool,
    ) -> WorkerResult<String> {
        // 冷却门：先等待剩余冷却时长
        if let Some(wait) = self.state.remaining_cooldown(Instant::now()) {
            info!("⏳ LLM 路由器处于冷却期，等待 {:.1} 秒", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }

        for entry in &self.entries {
            let provider = &entry.provider;

            if require_vision && !provider.supports_vision() {
                debug!("跳过不支持视觉的提供商: {}", provider.name());
                continue;
            }
            if !entry.ledger.try_record(Instant::now()) {
                warn!("提供商 {} 的滑动窗口已满，跳过", provider.name());
                continue;
            }

            match provider.generate(prompt, image_base64).await {
                Ok(text) if !text.is_empty() => {
                    debug!("✓ 提供商 {} 响应成功", provider.name());
                    return Ok(text);
                }
                Ok(_) => {
                    warn!("提供商 {} 返回空响应，切换下一个", provider.name());
                }
                Err(e) => {
                    warn!("提供商 {} 调用失败: {}，切换下一个", provider.name(), e);
                }
            }
        }

        // 无合格提供商或全部失败：触发全局冷却
        self.state.trigger_cooldown(Instant::now());
        warn!("❌ 所有 LLM 提供商均已耗尽，进入 {} 秒冷却期", COOLDOWN.as_secs());
        Err(WorkerError::ProvidersExhausted {
            cooldown_secs: COOLDOWN.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可编程的假提供商
    struct MockProvider {
        name: String,
        vision: bool,
        ceiling: u32,
        responses: Mutex<VecDeque<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(name: &str, vision: bool, ceiling: u32) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                vision,
                ceiling,
                responses: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn push_ok(self: &Arc<Self>, text: &str) -> Arc<Self> {
            self.responses.lock().unwrap().push_back(Ok(text.to_string()));
            self.clone()
        }

        fn push_err(self: &Arc<Self>, message: &str) -> Arc<Self> {
            self.responses.lock().unwrap().push_back(Err(message.to_string()));
            self.clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn supports_vision(&self) -> bool {
            self.vision
        }

        fn rate_ceiling(&self) -> u32 {
            self.ceiling
        }

        async fn generate(&self, _prompt: &str, _image: Option<&str>) -> WorkerResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(WorkerError::provider(self.name.clone(), message)),
                None => Ok("default".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_first_eligible_provider_wins() {
        let first = MockProvider::new("first", true, 10);
        first.push_ok("from-first");
        let second = MockProvider::new("second", true, 10);

        let router =
            LlmRouter::new(vec![first.clone() as Arc<dyn LlmProvider>, second.clone()]);
        let text = router.generate("hello", None, false).await.unwrap();

        assert_eq!(text, "from-first");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_require_vision_never_selects_text_provider() {
        let text_only = MockProvider::new("text-only", false, 10);
        text_only.push_ok("should-not-be-used");
        let vision = MockProvider::new("vision", true, 10);
        vision.push_ok("from-vision");

        let router =
            LlmRouter::new(vec![text_only.clone() as Arc<dyn LlmProvider>, vision.clone()]);
        let text = router.generate("describe", Some("aGk="), true).await.unwrap();

        assert_eq!(text, "from-vision");
        assert_eq!(text_only.calls(), 0);
    }

    #[tokio::test]
    async fn test_failover_on_error_and_empty_response() {
        let failing = MockProvider::new("failing", true, 10);
        failing.push_err("HTTP 500");
        let empty = MockProvider::new("empty", true, 10);
        empty.push_ok("");
        let healthy = MockProvider::new("healthy", true, 10);
        healthy.push_ok("recovered");

        let router = LlmRouter::new(vec![
            failing.clone() as Arc<dyn LlmProvider>,
            empty.clone(),
            healthy.clone(),
        ]);
        let text = router.generate("hello", None, false).await.unwrap();

        assert_eq!(text, "recovered");
        assert_eq!(failing.calls(), 1);
        assert_eq!(empty.calls(), 1);
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_sets_cooldown_and_later_call_waits() {
        let provider = MockProvider::new("only", true, 10);
        provider.push_err("down");

        let router = LlmRouter::new(vec![provider.clone() as Arc<dyn LlmProvider>]);
        let err = router.generate("hello", None, false).await.unwrap_err();
        assert!(matches!(err, WorkerError::ProvidersExhausted { cooldown_secs: 60 }));

        // 10 秒后发起的调用应当先挂起约 50 秒再尝试提供商
        tokio::time::advance(Duration::from_secs(10)).await;
        provider.push_ok("after-cooldown");

        let before = Instant::now();
        let text = router.generate("hello", None, false).await.unwrap();
        let waited = before.elapsed();

        assert_eq!(text, "after-cooldown");
        assert!(waited >= Duration::from_secs(49), "等待 {:?}", waited);
        assert!(waited <= Duration::from_secs(51), "等待 {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_ceiling_within_window() {
        let provider = MockProvider::new("limited", true, 2);
        provider.push_ok("one");
        provider.push_ok("two");
        provider.push_ok("three");

        let router = LlmRouter::new(vec![provider.clone() as Arc<dyn LlmProvider>]);
        router.generate("a", None, false).await.unwrap();
        router.generate("b", None, false).await.unwrap();

        // 第三次调用：窗口已满 → 无合格提供商 → 耗尽
        let err = router.generate("c", None, false).await.unwrap_err();
        assert!(matches!(err, WorkerError::ProvidersExhausted { .. }));
        assert_eq!(provider.calls(), 2);

        // 窗口滑过之后恢复可用（冷却 60 秒也同时过期）
        tokio::time::advance(Duration::from_secs(61)).await;
        let text = router.generate("d", None, false).await.unwrap();
        assert_eq!(text, "three");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_never_exceeds_ceiling_in_any_window() {
        let ledger = ProviderLedger::new(3);
        let mut recorded = 0;

        // 以 10 秒为步长尝试记录 20 次，统计任意时刻窗口内的数量
        for _ in 0..20 {
            if ledger.try_record(Instant::now()) {
                recorded += 1;
            }
            assert!(ledger.in_window(Instant::now()) <= 3);
            tokio::time::advance(Duration::from_secs(10)).await;
        }
        assert!(recorded > 3, "窗口滑动后应能继续记录");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_timestamp_is_monotonic() {
        let state = RouterState::new();
        state.trigger_cooldown(Instant::now());
        let first = state.remaining_cooldown(Instant::now()).unwrap();

        // 更早的 now 不会把冷却时间戳往回拨
        tokio::time::advance(Duration::from_secs(5)).await;
        state.trigger_cooldown(Instant::now() - Duration::from_secs(30));
        let second = state.remaining_cooldown(Instant::now()).unwrap();

        assert!(second >= first - Duration::from_secs(5) - Duration::from_millis(10));
    }
}
