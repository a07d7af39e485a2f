//! 动作层：任务令牌对应的站点操作
//!
//! registry 定义 Action trait 与注册表；contacts / explore / search / photos
//! 按站点页面分组实现具体动作，都要浏览器在场（feature "browser"）。
//! 链接归类是纯函数，放在本模块顶层，不依赖浏览器也能测。

pub mod registry;

#[cfg(feature = "browser")]
pub mod contacts;
#[cfg(feature = "browser")]
pub mod explore;
#[cfg(feature = "browser")]
pub mod photos;
#[cfg(feature = "browser")]
pub mod search;

pub use registry::{Action, ActionRegistry};

use std::collections::HashSet;

/// 照片流与人员列表页上值得收的链接，宽选严过滤，细分交给 harvest_links
pub(crate) const STREAM_LINKS: &str = "a[href*='/photos/']";

/// 归类后的站内链接
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlickrLink {
    /// 个人照片流 /photos/{owner}/，规范化为带尾斜杠的绝对地址
    Contact(String),
    /// 单张照片 /photos/{owner}/{id}/，后面的 /in/... 上下文后缀丢弃
    Photo { url: String, owner: String },
}

/// 把页面摘下来的 href 归类成联系人或照片链接；站外和无关路径返回 None
pub fn classify_link(href: &str) -> Option<FlickrLink> {
    let href = href.split('?').next()?.split('#').next()?;
    let path = href
        .strip_prefix("https://www.flickr.com")
        .or_else(|| href.strip_prefix("http://www.flickr.com"))
        .or_else(|| href.strip_prefix("https://flickr.com"))?;

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next()? != "photos" {
        return None;
    }
    let owner = segments.next()?;
    match segments.next() {
        None => Some(FlickrLink::Contact(format!(
            "https://www.flickr.com/photos/{}/",
            owner
        ))),
        Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
            Some(FlickrLink::Photo {
                url: format!("https://www.flickr.com/photos/{}/{}/", owner, id),
                owner: owner.to_string(),
            })
        }
        // albums、galleries 等子页不收
        Some(_) => None,
    }
}

/// 一次检测动作从页面上收获的链接，已去重并剔除自己的内容
#[derive(Debug, Default)]
pub struct Harvest {
    pub contacts: Vec<String>,
    pub photos: Vec<String>,
}

/// 批量归类 href：保序去重，跳过自己的照片流和自己的照片
pub fn harvest_links(hrefs: &[String], own_contact_url: Option<&str>) -> Harvest {
    let own_slug = own_contact_url.and_then(owner_slug);
    let mut harvest = Harvest::default();
    let mut seen_contacts = HashSet::new();
    let mut seen_photos = HashSet::new();

    for href in hrefs {
        match classify_link(href) {
            Some(FlickrLink::Contact(url)) => {
                if owner_slug(&url) == own_slug && own_slug.is_some() {
                    continue;
                }
                if seen_contacts.insert(url.clone()) {
                    harvest.contacts.push(url);
                }
            }
            Some(FlickrLink::Photo { url, owner }) => {
                if own_slug.as_deref() == Some(owner.as_str()) {
                    continue;
                }
                if seen_photos.insert(url.clone()) {
                    harvest.photos.push(url);
                }
            }
            None => {}
        }
    }
    harvest
}

/// 从 /photos/{owner}/ 形式的地址取出 owner 段
pub fn owner_slug(contact_url: &str) -> Option<String> {
    let path = contact_url
        .strip_prefix("https://www.flickr.com")
        .or_else(|| contact_url.strip_prefix("http://www.flickr.com"))?;
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next()? != "photos" {
        return None;
    }
    segments.next().map(|s| s.to_string())
}

/// 配置里逗号分隔的关键词表，去空白丢空项
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(feature = "browser")]
pub use context::{full_registry, ActionContext};

#[cfg(feature = "browser")]
mod context {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::Rng;

    use crate::actions::contacts::{
        DetectContactsFollowBack, DetectContactsUnfollowBack, DoContactsFav, DoContactsFollow,
        DoContactsUnfollow,
    };
    use crate::actions::explore::DetectExplored;
    use crate::actions::photos::{DetectRecentContactPhotos, DoPhotosFav};
    use crate::actions::search::SearchKeywords;
    use crate::actions::ActionRegistry;
    use crate::browser::FlickrPage;
    use crate::config::FlickrSection;
    use crate::session::SessionStore;

    /// 动作共享的协作者包：页面、存档和站点参数
    pub struct ActionContext {
        pub page: Arc<FlickrPage>,
        pub store: Arc<SessionStore>,
        pub flickr: FlickrSection,
    }

    impl ActionContext {
        pub fn new(page: Arc<FlickrPage>, store: Arc<SessionStore>, flickr: FlickrSection) -> Self {
            ActionContext { page, store, flickr }
        }

        /// 批量点击之间随机歇一会，保持人手节奏
        pub async fn click_throttle(&self) {
            let ms = if self.flickr.click_max_ms > self.flickr.click_min_ms {
                rand::thread_rng().gen_range(self.flickr.click_min_ms..=self.flickr.click_max_ms)
            } else {
                self.flickr.click_min_ms
            };
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        /// 按模板拼搜索地址，空格替换成 +
        pub fn search_url(&self, keyword: &str) -> String {
            self.flickr.url_search.replace("{}", &keyword.replace(' ', "+"))
        }
    }

    /// 装配全部站点动作
    pub fn full_registry(ctx: Arc<ActionContext>) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(DetectContactsFollowBack::new(ctx.clone())));
        registry.register(Arc::new(DetectContactsUnfollowBack::new(ctx.clone())));
        registry.register(Arc::new(DetectExplored::all(ctx.clone())));
        registry.register(Arc::new(DetectExplored::contacts_only(ctx.clone())));
        registry.register(Arc::new(DetectExplored::photos_only(ctx.clone())));
        registry.register(Arc::new(SearchKeywords::all(ctx.clone())));
        registry.register(Arc::new(SearchKeywords::contacts_only(ctx.clone())));
        registry.register(Arc::new(SearchKeywords::photos_only(ctx.clone())));
        registry.register(Arc::new(DoContactsFollow::new(ctx.clone())));
        registry.register(Arc::new(DoContactsUnfollow::new(ctx.clone())));
        registry.register(Arc::new(DoContactsFav::new(ctx.clone())));
        registry.register(Arc::new(DoPhotosFav::new(ctx.clone())));
        registry.register(Arc::new(DetectRecentContactPhotos::new(ctx)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_contact_link() {
        assert_eq!(
            classify_link("https://www.flickr.com/photos/alice/"),
            Some(FlickrLink::Contact("https://www.flickr.com/photos/alice/".to_string()))
        );
        // 无尾斜杠、带查询串都归一化
        assert_eq!(
            classify_link("https://www.flickr.com/photos/alice?from=explore"),
            Some(FlickrLink::Contact("https://www.flickr.com/photos/alice/".to_string()))
        );
    }

    #[test]
    fn test_classify_photo_link() {
        assert_eq!(
            classify_link("https://www.flickr.com/photos/alice/53211234567/"),
            Some(FlickrLink::Photo {
                url: "https://www.flickr.com/photos/alice/53211234567/".to_string(),
                owner: "alice".to_string(),
            })
        );
        // /in/explore 上下文后缀丢弃
        assert_eq!(
            classify_link("https://www.flickr.com/photos/alice/53211234567/in/explore-2024-06-01/"),
            Some(FlickrLink::Photo {
                url: "https://www.flickr.com/photos/alice/53211234567/".to_string(),
                owner: "alice".to_string(),
            })
        );
    }

    #[test]
    fn test_classify_rejects_foreign_and_sub_pages() {
        assert_eq!(classify_link("https://example.com/photos/alice/"), None);
        assert_eq!(classify_link("https://www.flickr.com/groups/catlovers/"), None);
        assert_eq!(classify_link("https://www.flickr.com/photos/alice/albums/72157"), None);
        assert_eq!(classify_link("https://www.flickr.com/"), None);
    }

    #[test]
    fn test_harvest_dedups_and_skips_own() {
        let hrefs = vec![
            "https://www.flickr.com/photos/alice/".to_string(),
            "https://www.flickr.com/photos/alice".to_string(),
            "https://www.flickr.com/photos/me/".to_string(),
            "https://www.flickr.com/photos/me/111/".to_string(),
            "https://www.flickr.com/photos/bob/222/".to_string(),
            "https://www.flickr.com/photos/bob/222/in/explore/".to_string(),
        ];
        let harvest = harvest_links(&hrefs, Some("https://www.flickr.com/photos/me/"));
        assert_eq!(harvest.contacts, vec!["https://www.flickr.com/photos/alice/"]);
        assert_eq!(harvest.photos, vec!["https://www.flickr.com/photos/bob/222/"]);
    }

    #[test]
    fn test_owner_slug() {
        assert_eq!(
            owner_slug("https://www.flickr.com/photos/alice/"),
            Some("alice".to_string())
        );
        assert_eq!(owner_slug("https://www.flickr.com/explore"), None);
    }

    #[test]
    fn test_split_keywords() {
        assert_eq!(
            split_keywords(" street photography , cats ,,bw "),
            vec!["street photography", "cats", "bw"]
        );
        assert!(split_keywords("  , ").is_empty());
    }
}
