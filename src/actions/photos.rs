//! 照片动作：批量收藏与联系人新照片检测

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{harvest_links, Action, ActionContext, STREAM_LINKS};
use crate::core::error::BotError;
use crate::core::program::ActionKind;

/// 照片页上的收藏按钮，DOCONTACTSFAV 也用它
pub(crate) const FAV_BUTTON: &str = "button[data-testid='fave-button']";

/// DOPHOTOSFAV：按批量上限收藏排队的照片
pub struct DoPhotosFav {
    ctx: Arc<ActionContext>,
}

impl DoPhotosFav {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DoPhotosFav {
    fn kind(&self) -> ActionKind {
        ActionKind::DoPhotosFav
    }

    async fn run(&self) -> Result<(), BotError> {
        let mut faved = 0usize;
        for _ in 0..self.ctx.flickr.fav_batch_max {
            let photo = match self.ctx.store.take_photos_to_fav(1)?.pop() {
                Some(p) => p,
                None => break,
            };

            self.ctx.page.goto(&photo).await?;
            if self.ctx.page.click_if_present(FAV_BUTTON).await? {
                faved += 1;
            } else {
                // 照片被删或转私有，跳过即可
                tracing::warn!(photo = %photo, "fave button missing, skipping");
            }
            self.ctx.click_throttle().await;
        }
        tracing::info!(faved, "photos faved");
        Ok(())
    }
}

/// DETECTRECENTCONTACTPHOTOS：逛已关注联系人的最新照片流，新照片排进收藏队列
pub struct DetectRecentContactPhotos {
    ctx: Arc<ActionContext>,
}

impl DetectRecentContactPhotos {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for DetectRecentContactPhotos {
    fn kind(&self) -> ActionKind {
        ActionKind::DetectRecentContactPhotos
    }

    async fn run(&self) -> Result<(), BotError> {
        self.ctx.page.goto(&self.ctx.flickr.url_contacts).await?;
        self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;

        let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
        let own = self.ctx.store.user_contact_url();
        let harvest = harvest_links(&hrefs, own.as_deref());

        let queued = self.ctx.store.queue_photos_to_fav(harvest.photos)?;
        tracing::info!(queued, "recent contact photos queued");
        Ok(())
    }
}
