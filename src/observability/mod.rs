//! 日志初始化
//!
//! 默认 info 级别，可用 RUST_LOG 覆盖（如 `RUST_LOG=flickrbot=debug`）。
//! 机器人长时间无人值守运行，进度与批量动作的结果都靠这里输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();
}
