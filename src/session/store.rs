//! 会话数据存档
//!
//! 登录身份、Cookie 和四条工作队列落在同一个 JSON 文件里，检查点一次写全。
//! 队列入队即去重：已排除、已在队或已处理过的条目不再进队，这样反复
//! DETECT 同一页面不会把关注队列灌爆。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::engine::Checkpoint;
use crate::core::error::BotError;

/// 随检查点整体读写的会话数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// 已登录用户的个人页 URL；None 表示从未登录成功过
    pub user_contact_url: Option<String>,
    /// 浏览器 Cookie 的不透明 JSON 快照，存档侧不解析内容
    pub cookies: Option<Value>,
    pub contacts_to_follow: Vec<String>,
    pub contacts_to_unfollow: Vec<String>,
    pub contacts_to_fav: Vec<String>,
    pub photos_to_fav: Vec<String>,
    /// 处理过（进过关注队列）的联系人，避免重复关注
    pub known_contacts: HashSet<String>,
    /// 处理过的照片，避免重复收藏
    pub known_photos: HashSet<String>,
    /// 永不再碰的联系人（关注失败或人工拉黑）
    pub banned_contacts: HashSet<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// 各队列当前长度，启动与检测后的日志用
#[derive(Debug, Clone, Copy)]
pub struct QueueCounts {
    pub follow: usize,
    pub unfollow: usize,
    pub contact_fav: usize,
    pub photo_fav: usize,
}

/// 单文件 JSON 存档，内部用互斥锁保护，动作层通过 Arc 共享
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    data: Mutex<SessionData>,
}

impl SessionStore {
    /// 打开存档：文件存在则装载（坏档直接报错），不存在则从空白开始
    pub fn open(path: impl AsRef<Path>) -> Result<SessionStore, BotError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| BotError::Checkpoint(format!("Read session data failed: {}", e)))?;
            let data: SessionData = serde_json::from_str(&raw)
                .map_err(|e| BotError::Checkpoint(format!("Parse session data failed: {}", e)))?;
            tracing::debug!(
                path = %path.display(),
                follow = data.contacts_to_follow.len(),
                photo_fav = data.photos_to_fav.len(),
                "session data loaded"
            );
            data
        } else {
            tracing::debug!(path = %path.display(), "no session data yet, starting fresh");
            SessionData::default()
        };
        Ok(SessionStore { path, data: Mutex::new(data) })
    }

    fn locked(&self) -> Result<MutexGuard<'_, SessionData>, BotError> {
        self.data
            .lock()
            .map_err(|e| BotError::Checkpoint(format!("Session lock poisoned: {}", e)))
    }

    pub fn user_contact_url(&self) -> Option<String> {
        self.data.lock().ok().and_then(|d| d.user_contact_url.clone())
    }

    pub fn set_user_contact_url(&self, url: String) -> Result<(), BotError> {
        self.locked()?.user_contact_url = Some(url);
        Ok(())
    }

    pub fn cookies(&self) -> Option<Value> {
        self.data.lock().ok().and_then(|d| d.cookies.clone())
    }

    pub fn set_cookies(&self, cookies: Value) -> Result<(), BotError> {
        self.locked()?.cookies = Some(cookies);
        Ok(())
    }

    /// 新联系人进关注队列；已知、已排除或已在队的跳过，返回实际入队数
    pub fn queue_contacts_to_follow(&self, urls: Vec<String>) -> Result<usize, BotError> {
        let mut data = self.locked()?;
        let mut added = 0;
        for url in urls {
            if data.known_contacts.contains(&url)
                || data.banned_contacts.contains(&url)
                || data.contacts_to_follow.contains(&url)
            {
                continue;
            }
            data.known_contacts.insert(url.clone());
            data.contacts_to_follow.push(url);
            added += 1;
        }
        Ok(added)
    }

    /// 待取关联系人入队，只做队内去重
    pub fn queue_contacts_to_unfollow(&self, urls: Vec<String>) -> Result<usize, BotError> {
        let mut data = self.locked()?;
        let mut added = 0;
        for url in urls {
            if data.contacts_to_unfollow.contains(&url) {
                continue;
            }
            data.contacts_to_unfollow.push(url);
            added += 1;
        }
        Ok(added)
    }

    /// 待收藏联系人入队；已排除或已在队的跳过
    pub fn queue_contacts_to_fav(&self, urls: Vec<String>) -> Result<usize, BotError> {
        let mut data = self.locked()?;
        let mut added = 0;
        for url in urls {
            if data.banned_contacts.contains(&url) || data.contacts_to_fav.contains(&url) {
                continue;
            }
            data.contacts_to_fav.push(url);
            added += 1;
        }
        Ok(added)
    }

    /// 待收藏照片入队；处理过或已在队的跳过
    pub fn queue_photos_to_fav(&self, urls: Vec<String>) -> Result<usize, BotError> {
        let mut data = self.locked()?;
        let mut added = 0;
        for url in urls {
            if data.known_photos.contains(&url) || data.photos_to_fav.contains(&url) {
                continue;
            }
            data.known_photos.insert(url.clone());
            data.photos_to_fav.push(url);
            added += 1;
        }
        Ok(added)
    }

    /// 从队头取出至多 max 个联系人去关注
    pub fn take_contacts_to_follow(&self, max: usize) -> Result<Vec<String>, BotError> {
        let mut data = self.locked()?;
        let n = max.min(data.contacts_to_follow.len());
        Ok(data.contacts_to_follow.drain(..n).collect())
    }

    pub fn take_contacts_to_unfollow(&self, max: usize) -> Result<Vec<String>, BotError> {
        let mut data = self.locked()?;
        let n = max.min(data.contacts_to_unfollow.len());
        Ok(data.contacts_to_unfollow.drain(..n).collect())
    }

    pub fn take_contacts_to_fav(&self, max: usize) -> Result<Vec<String>, BotError> {
        let mut data = self.locked()?;
        let n = max.min(data.contacts_to_fav.len());
        Ok(data.contacts_to_fav.drain(..n).collect())
    }

    pub fn take_photos_to_fav(&self, max: usize) -> Result<Vec<String>, BotError> {
        let mut data = self.locked()?;
        let n = max.min(data.photos_to_fav.len());
        Ok(data.photos_to_fav.drain(..n).collect())
    }

    /// 照片记入处理过名单；之前没见过返回 true
    pub fn mark_photo_known(&self, url: &str) -> Result<bool, BotError> {
        Ok(self.locked()?.known_photos.insert(url.to_string()))
    }

    /// 拉黑联系人：从各队列移除并记入排除名单
    pub fn ban_contact(&self, url: &str) -> Result<(), BotError> {
        let mut data = self.locked()?;
        data.contacts_to_follow.retain(|c| c != url);
        data.contacts_to_unfollow.retain(|c| c != url);
        data.contacts_to_fav.retain(|c| c != url);
        data.banned_contacts.insert(url.to_string());
        Ok(())
    }

    pub fn queue_counts(&self) -> Result<QueueCounts, BotError> {
        let data = self.locked()?;
        Ok(QueueCounts {
            follow: data.contacts_to_follow.len(),
            unfollow: data.contacts_to_unfollow.len(),
            contact_fav: data.contacts_to_fav.len(),
            photo_fav: data.photos_to_fav.len(),
        })
    }
}

impl Checkpoint for SessionStore {
    /// 全量落盘；父目录不存在时自动创建
    fn checkpoint(&self) -> Result<(), BotError> {
        let mut data = self.locked()?;
        data.saved_at = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BotError::Checkpoint(format!("Create data dir failed: {}", e)))?;
        }
        let json = serde_json::to_string_pretty(&*data)
            .map_err(|e| BotError::Checkpoint(format!("Encode session data failed: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| BotError::Checkpoint(format!("Write session data failed: {}", e)))?;

        tracing::debug!(path = %self.path.display(), "session data saved");
        Ok(())
    }
}
