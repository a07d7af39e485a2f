//! flickrbot - Flickr 自动关注机器人
//!
//! 入口：初始化日志、读配置、装配机器人并跑完任务表。
//! 可选的第一个命令行参数是附加配置文件路径，键值覆盖 config/default.toml。

use anyhow::Context;
use flickrbot::bot::create_bot;
use flickrbot::config::load_config;
use flickrbot::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    tracing::info!("## LOADING...");
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let mut bot = create_bot(cfg).await.context("Failed to create bot")?;
    bot.run().await.context("Bot run failed")?;

    Ok(())
}
