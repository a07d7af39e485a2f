//! flickrbot - Flickr 自动关注机器人
//!
//! 模块划分：
//! - **actions**: 任务令牌对应的站点动作与注册表
//! - **bot**: 按配置装配引擎与转储器
//! - **browser**: Headless Chrome 页面封装（feature "browser"）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务程序、执行引擎、失败转储、统一错误
//! - **observability**: 日志初始化
//! - **session**: 登录流程与会话数据存档

pub mod actions;
pub mod bot;
pub mod browser;
pub mod config;
pub mod core;
pub mod observability;
pub mod session;

pub use bot::{create_bot, FlickrBot};
pub use crate::core::error::BotError;
