use anyhow::Result;
use automateflow_worker::orchestrator::App;
use automateflow_worker::utils::logging;
use automateflow_worker::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行工作进程
    App::initialize(config).await?.run().await?;

    Ok(())
}
