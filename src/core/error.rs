//! 机器人统一错误类型
//!
//! 按出错层面分组：配置装载、登录会话、浏览器操作、动作执行、数据落盘。
//! 各层用 `?` 一路上抛到 main，由 main 统一记日志、触发现场转储并定退出码。

use thiserror::Error;

/// 机器人运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Config error: {0}")]
    Config(String),

    /// 登录失败或恢复会话后身份核对不通过
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Action failed: {0}")]
    Action(String),

    /// 会话数据读写失败（文件 IO 或序列化）
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}
