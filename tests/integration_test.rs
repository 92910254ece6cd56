use automateflow_worker::browser::BrowserEngine;
use automateflow_worker::config::Config;
use automateflow_worker::infrastructure::{JobQueue, RedisJobQueue};
use automateflow_worker::services::LlmRouter;
use automateflow_worker::utils::logging;
use std::time::Duration;

#[tokio::test]
#[ignore] // 默认忽略，需要本机浏览器：cargo test -- --ignored
async fn test_browser_launch_and_page() {
    // 初始化日志
    logging::init();

    // 启动无头浏览器
    let engine = BrowserEngine::launch().await.expect("启动浏览器失败");

    // 分配页面并导航
    let page = engine.new_page().await.expect("创建页面失败");
    page.goto("https://example.com").await.expect("导航失败");

    let title = page.get_title().await.expect("读取标题失败");
    println!("页面标题: {:?}", title);
    assert!(title.unwrap_or_default().contains("Example"));

    engine.close().await;
}

#[tokio::test]
#[ignore] // 需要本机 Redis
async fn test_queue_claim_and_ack_roundtrip() {
    logging::init();

    let config = Config::from_env();
    let queue = RedisJobQueue::connect(&config.redis_url, "automation-jobs-test")
        .await
        .expect("连接 Redis 失败");

    // 空队列：认领超时返回 None
    let claimed = queue.claim(Duration::from_secs(1)).await.expect("认领失败");
    println!("空队列认领结果: {:?}", claimed);
    assert!(claimed.is_none());
}

#[tokio::test]
#[ignore] // 需要配置真实的 LLM 提供商密钥
async fn test_llm_router_live_generate() {
    logging::init();

    let config = Config::from_env();
    let router = LlmRouter::from_config(&config);
    assert!(router.provider_count() > 0, "未配置任何 LLM 提供商");

    let response = router
        .generate("Reply with the single word: pong", None, false)
        .await
        .expect("LLM 调用失败");

    println!("\n========== LLM 响应 ==========");
    println!("{}", response);
    println!("==============================\n");
    assert!(!response.is_empty());
}
