//! 会话层：登录流程与会话数据存档

#[cfg(feature = "browser")]
pub mod auth;
pub mod store;

#[cfg(feature = "browser")]
pub use auth::FlickrSession;
pub use store::{QueueCounts, SessionData, SessionStore};
