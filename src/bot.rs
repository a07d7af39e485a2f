//! 机器人装配与运行
//!
//! 把配置、存档、浏览器、会话和动作注册表拼成一台 TaskEngine，外带失败
//! 现场转储器。引擎跑挂时先转储再上抛；无论成败，浏览器句柄在最后统一
//! 释放，退出码交给 main 决定。

use crate::config::AppConfig;
use crate::core::dump::DiagnosticDumper;
use crate::core::engine::TaskEngine;
use crate::core::error::BotError;

pub struct FlickrBot {
    engine: TaskEngine,
    dumper: DiagnosticDumper,
    #[cfg(feature = "browser")]
    page: std::sync::Arc<crate::browser::FlickrPage>,
}

impl FlickrBot {
    /// 跑完整张任务表；失败时先转储现场再把错误交还调用方。
    /// 转储要用到活的页面，所以浏览器释放永远排在转储之后。
    pub async fn run(&mut self) -> Result<(), BotError> {
        let result = match self.engine.run().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "bot run failed");
                self.dumper.dump_after_failure().await;
                Err(e)
            }
        };
        #[cfg(feature = "browser")]
        self.page.close();
        result
    }
}

/// 按配置装配机器人：存档、浏览器、登录会话、全部站点动作
#[cfg(feature = "browser")]
pub async fn create_bot(cfg: AppConfig) -> Result<FlickrBot, BotError> {
    use std::sync::Arc;

    use crate::actions::{full_registry, ActionContext};
    use crate::browser::FlickrPage;
    use crate::core::engine::{LoopBudget, PauseRange, SavePolicy};
    use crate::core::program::TaskProgram;
    use crate::session::{FlickrSession, SessionStore};

    let store = Arc::new(SessionStore::open(&cfg.bot.data_path)?);
    let counts = store.queue_counts()?;
    tracing::info!(
        follow = counts.follow,
        unfollow = counts.unfollow,
        contact_fav = counts.contact_fav,
        photo_fav = counts.photo_fav,
        "session store ready"
    );

    let program = TaskProgram::parse(&cfg.bot.tasks);
    if program.is_empty() {
        tracing::warn!("task program is empty, nothing will run");
    }

    let page = Arc::new(FlickrPage::open(&cfg.browser).await?);
    let session = Arc::new(FlickrSession::new(
        page.clone(),
        store.clone(),
        cfg.flickr.clone(),
    ));
    let ctx = Arc::new(ActionContext::new(
        page.clone(),
        store.clone(),
        cfg.flickr.clone(),
    ));
    let actions = full_registry(ctx);
    tracing::debug!(
        actions = actions.len(),
        tokens = ?actions.registered_tokens(),
        "action registry assembled"
    );

    let policy = SavePolicy {
        after_each_action: cfg.bot.save_after_each_action,
        on_loop: cfg.bot.save_on_loop,
        on_end: cfg.bot.save_on_end,
    };
    let pause = PauseRange {
        min_secs: cfg.bot.pause_min_secs,
        max_secs: cfg.bot.pause_max_secs,
    };
    let budget = LoopBudget::from_limit(cfg.bot.loop_task_limit);

    let engine = TaskEngine::new(
        program,
        actions,
        session,
        store.clone(),
        policy,
        pause,
        budget,
    );
    let dumper = DiagnosticDumper::new(page.clone(), store);

    Ok(FlickrBot { engine, dumper, page })
}

#[cfg(not(feature = "browser"))]
pub async fn create_bot(_cfg: AppConfig) -> Result<FlickrBot, BotError> {
    Err(BotError::Config(
        "Built without browser support; enable the \"browser\" feature".to_string(),
    ))
}
