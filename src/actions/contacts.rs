//! 联系人动作：回关检测、取关检测、批量关注 / 取关 / 收藏
//!
//! 关注失败的联系人直接拉黑，不做重试；取关失败只告警，下轮检测会再排队。
//! 批量动作逐个出队处理，中途炸掉最多丢当前这一个条目。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::photos::FAV_BUTTON;
use crate::actions::{harvest_links, owner_slug, Action, ActionContext, STREAM_LINKS};
use crate::core::error::BotError;
use crate::core::program::ActionKind;

const FOLLOW_BUTTON: &str = "button[data-testid='follow-button']";
const FOLLOWING_BUTTON: &str = "button[data-testid='following-button']";
const UNFOLLOW_CONFIRM: &str = "button[data-testid='unfollow-confirm']";

/// 每次拜访一个联系人照片流时最多收藏几张
const FAVS_PER_CONTACT: usize = 3;

fn followers_url(own_contact_url: &str) -> Option<String> {
    owner_slug(own_contact_url).map(|s| format!("https://www.flickr.com/people/{}/followers/", s))
}

fn following_url(own_contact_url: &str) -> Option<String> {
    owner_slug(own_contact_url).map(|s| format!("https://www.flickr.com/people/{}/contacts/", s))
}

fn own_contact_url(ctx: &ActionContext) -> Result<String, BotError> {
    ctx.store
        .user_contact_url()
        .ok_or_else(|| BotError::Auth("No logged user in session".to_string()))
}

/// DETECTCONTACTSFOLLOWBACK：把自己的粉丝排进关注队列回关，
/// 同时排进收藏队列，供 DOCONTACTSFAV 回访点赞
pub struct DetectContactsFollowBack {
    ctx: Arc<ActionContext>,
}

impl DetectContactsFollowBack {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DetectContactsFollowBack {
    fn kind(&self) -> ActionKind {
        ActionKind::DetectContactsFollowBack
    }

    async fn run(&self) -> Result<(), BotError> {
        let own = own_contact_url(&self.ctx)?;
        let url = followers_url(&own)
            .ok_or_else(|| BotError::Action("Cannot derive followers url".to_string()))?;

        self.ctx.page.goto(&url).await?;
        self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;
        let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
        let harvest = harvest_links(&hrefs, Some(&own));

        let queued = self.ctx.store.queue_contacts_to_follow(harvest.contacts.clone())?;
        // 收藏队列只挡排除名单，出队后的粉丝下轮检测会重新进队
        let queued_fav = self.ctx.store.queue_contacts_to_fav(harvest.contacts)?;
        tracing::info!(queued, queued_fav, "followers queued for follow-back and fav");
        Ok(())
    }
}

/// DETECTCONTACTSUNFOLLOWBACK：找出没回关自己的联系人，排进取关队列
pub struct DetectContactsUnfollowBack {
    ctx: Arc<ActionContext>,
}

impl DetectContactsUnfollowBack {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DetectContactsUnfollowBack {
    fn kind(&self) -> ActionKind {
        ActionKind::DetectContactsUnfollowBack
    }

    async fn run(&self) -> Result<(), BotError> {
        let own = own_contact_url(&self.ctx)?;
        let followers_page = followers_url(&own)
            .ok_or_else(|| BotError::Action("Cannot derive followers url".to_string()))?;
        let following_page = following_url(&own)
            .ok_or_else(|| BotError::Action("Cannot derive contacts url".to_string()))?;

        self.ctx.page.goto(&followers_page).await?;
        self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;
        let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
        let followers: HashSet<String> =
            harvest_links(&hrefs, Some(&own)).contacts.into_iter().collect();

        self.ctx.page.goto(&following_page).await?;
        self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;
        let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
        let following = harvest_links(&hrefs, Some(&own)).contacts;

        let stale: Vec<String> = following
            .into_iter()
            .filter(|c| !followers.contains(c))
            .collect();
        let queued = self.ctx.store.queue_contacts_to_unfollow(stale)?;
        tracing::info!(queued, "contacts without follow-back queued for unfollow");
        Ok(())
    }
}

/// DOCONTACTSFOLLOW：按批量上限关注排队的联系人
pub struct DoContactsFollow {
    ctx: Arc<ActionContext>,
}

impl DoContactsFollow {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DoContactsFollow {
    fn kind(&self) -> ActionKind {
        ActionKind::DoContactsFollow
    }

    async fn run(&self) -> Result<(), BotError> {
        let mut followed = 0usize;
        for _ in 0..self.ctx.flickr.follow_batch_max {
            let contact = match self.ctx.store.take_contacts_to_follow(1)?.pop() {
                Some(c) => c,
                None => break,
            };

            self.ctx.page.goto(&contact).await?;
            if self.ctx.page.click_if_present(FOLLOW_BUTTON).await? {
                followed += 1;
            } else {
                tracing::warn!(contact = %contact, "follow button missing, excluding contact");
                self.ctx.store.ban_contact(&contact)?;
            }
            self.ctx.click_throttle().await;
        }
        tracing::info!(followed, "contacts followed");
        Ok(())
    }
}

/// DOCONTACTSUNFOLLOW：按批量上限取关排队的联系人
pub struct DoContactsUnfollow {
    ctx: Arc<ActionContext>,
}

impl DoContactsUnfollow {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DoContactsUnfollow {
    fn kind(&self) -> ActionKind {
        ActionKind::DoContactsUnfollow
    }

    async fn run(&self) -> Result<(), BotError> {
        let mut unfollowed = 0usize;
        for _ in 0..self.ctx.flickr.follow_batch_max {
            let contact = match self.ctx.store.take_contacts_to_unfollow(1)?.pop() {
                Some(c) => c,
                None => break,
            };

            self.ctx.page.goto(&contact).await?;
            if self.ctx.page.click_if_present(FOLLOWING_BUTTON).await? {
                // 站点会弹确认层，没弹就当一步完成
                self.ctx.page.click_if_present(UNFOLLOW_CONFIRM).await?;
                unfollowed += 1;
            } else {
                tracing::warn!(contact = %contact, "following button missing, skipping");
            }
            self.ctx.click_throttle().await;
        }
        tracing::info!(unfollowed, "contacts unfollowed");
        Ok(())
    }
}

/// DOCONTACTSFAV：拜访排队的联系人，收藏各自照片流最前面的几张
pub struct DoContactsFav {
    ctx: Arc<ActionContext>,
}

impl DoContactsFav {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DoContactsFav {
    fn kind(&self) -> ActionKind {
        ActionKind::DoContactsFav
    }

    async fn run(&self) -> Result<(), BotError> {
        let own = self.ctx.store.user_contact_url();
        let mut faved = 0usize;

        for _ in 0..self.ctx.flickr.fav_batch_max {
            let contact = match self.ctx.store.take_contacts_to_fav(1)?.pop() {
                Some(c) => c,
                None => break,
            };

            self.ctx.page.goto(&contact).await?;
            let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
            let photos = harvest_links(&hrefs, own.as_deref()).photos;

            let mut taken = 0usize;
            for photo in photos {
                if taken >= FAVS_PER_CONTACT {
                    break;
                }
                // 收藏过的不再碰
                if !self.ctx.store.mark_photo_known(&photo)? {
                    continue;
                }
                self.ctx.page.goto(&photo).await?;
                if self.ctx.page.click_if_present(FAV_BUTTON).await? {
                    faved += 1;
                    taken += 1;
                }
                self.ctx.click_throttle().await;
            }
        }
        tracing::info!(faved, "contact photos faved");
        Ok(())
    }
}
