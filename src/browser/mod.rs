//! 浏览器层：Headless Chrome 页面封装
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。

#[cfg(feature = "browser")]
pub mod chrome;

#[cfg(feature = "browser")]
pub use chrome::FlickrPage;
