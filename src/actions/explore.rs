//! 发现页检测：从 Explore 收获新联系人和新照片
//!
//! 三个令牌共用一套抓取流程，只差把哪类链接写进队列。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{harvest_links, Action, ActionContext, STREAM_LINKS};
use crate::core::error::BotError;
use crate::core::program::ActionKind;

/// DETECTEXPLORED 族：逛 Explore 页，按变体收联系人、照片或两者
pub struct DetectExplored {
    ctx: Arc<ActionContext>,
    kind: ActionKind,
}

impl DetectExplored {
    pub fn all(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::DetectExplored }
    }

    pub fn contacts_only(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::DetectExploredContactsOnly }
    }

    pub fn photos_only(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::DetectExploredPhotosOnly }
    }

    fn wants_contacts(&self) -> bool {
        !matches!(self.kind, ActionKind::DetectExploredPhotosOnly)
    }

    fn wants_photos(&self) -> bool {
        !matches!(self.kind, ActionKind::DetectExploredContactsOnly)
    }
}

#[async_trait]
impl Action for DetectExplored {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn run(&self) -> Result<(), BotError> {
        self.ctx.page.goto(&self.ctx.flickr.url_explore).await?;
        self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;

        let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
        let own = self.ctx.store.user_contact_url();
        let harvest = harvest_links(&hrefs, own.as_deref());

        if self.wants_contacts() {
            let queued = self.ctx.store.queue_contacts_to_follow(harvest.contacts)?;
            tracing::info!(queued, "explore contacts queued");
        }
        if self.wants_photos() {
            let queued = self.ctx.store.queue_photos_to_fav(harvest.photos)?;
            tracing::info!(queued, "explore photos queued");
        }
        Ok(())
    }
}
