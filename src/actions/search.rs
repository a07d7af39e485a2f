//! 关键词搜索检测：按配置的关键词逐个搜，收获联系人和照片
//!
//! 没配关键词时告警后直接算完成，不影响任务表里后面的步骤。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{harvest_links, split_keywords, Action, ActionContext, STREAM_LINKS};
use crate::core::error::BotError;
use crate::core::program::ActionKind;

/// SEARCHKEYWORDS 族：搜索结果页抓链接，按变体入队
pub struct SearchKeywords {
    ctx: Arc<ActionContext>,
    kind: ActionKind,
}

impl SearchKeywords {
    pub fn all(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::SearchKeywords }
    }

    pub fn contacts_only(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::SearchKeywordsContactsOnly }
    }

    pub fn photos_only(ctx: Arc<ActionContext>) -> Self {
        Self { ctx, kind: ActionKind::SearchKeywordsPhotosOnly }
    }

    fn wants_contacts(&self) -> bool {
        !matches!(self.kind, ActionKind::SearchKeywordsPhotosOnly)
    }

    fn wants_photos(&self) -> bool {
        !matches!(self.kind, ActionKind::SearchKeywordsContactsOnly)
    }
}

#[async_trait]
impl Action for SearchKeywords {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn run(&self) -> Result<(), BotError> {
        let keywords = split_keywords(&self.ctx.flickr.search_keywords);
        if keywords.is_empty() {
            tracing::warn!("no search keywords configured, nothing to do");
            return Ok(());
        }

        let own = self.ctx.store.user_contact_url();
        let mut contacts_queued = 0usize;
        let mut photos_queued = 0usize;

        for keyword in keywords {
            let url = self.ctx.search_url(&keyword);
            tracing::debug!(keyword = %keyword, "searching");

            self.ctx.page.goto(&url).await?;
            self.ctx.page.scroll_down(self.ctx.flickr.detect_scroll_screens).await?;

            let hrefs = self.ctx.page.collect_links(STREAM_LINKS).await?;
            let harvest = harvest_links(&hrefs, own.as_deref());

            if self.wants_contacts() {
                contacts_queued += self.ctx.store.queue_contacts_to_follow(harvest.contacts)?;
            }
            if self.wants_photos() {
                photos_queued += self.ctx.store.queue_photos_to_fav(harvest.photos)?;
            }
        }

        tracing::info!(contacts_queued, photos_queued, "search detection done");
        Ok(())
    }
}
