//! Flickr 登录会话
//!
//! 两条登录路径：优先用存档 Cookie 恢复（快、少触发风控），Cookie 失效或
//! 首跑时走表单登录。登录成功后把个人页 URL 和最新 Cookie 写回存档，
//! 供下次进程恢复。

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::FlickrPage;
use crate::config::FlickrSection;
use crate::core::engine::SessionFlow;
use crate::core::error::BotError;
use crate::session::store::SessionStore;

/// 登录表单与登录态的页面选择器，跟随站点改版调整
const LOGIN_EMAIL_INPUT: &str = "input#login-username";
const LOGIN_PASSWORD_INPUT: &str = "input#login-password";
const LOGIN_SUBMIT: &str = "button[data-testid='identity-form-submit-button']";
const SIGNED_IN_MARKER: &str = "[data-testid='account-menu']";
/// 顶栏头像指向自己照片流的链接
const OWN_PROFILE_LINK: &str = "a.gn-avatar, [data-testid='account-menu'] a[href*='/photos/']";
const COOKIE_BANNER_ACCEPT: &str = "button#onetrust-accept-btn-handler";

pub struct FlickrSession {
    page: Arc<FlickrPage>,
    store: Arc<SessionStore>,
    flickr: FlickrSection,
}

impl FlickrSession {
    pub fn new(page: Arc<FlickrPage>, store: Arc<SessionStore>, flickr: FlickrSection) -> FlickrSession {
        FlickrSession { page, store, flickr }
    }

    /// 从顶栏头像解析当前登录账号的个人页 URL
    async fn resolve_own_profile(&self) -> Result<String, BotError> {
        let links = self.page.collect_links(OWN_PROFILE_LINK).await?;
        links
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Auth("Could not resolve own profile url".to_string()))
    }
}

#[async_trait]
impl SessionFlow for FlickrSession {
    fn logged_user(&self) -> Option<String> {
        self.store.user_contact_url()
    }

    /// Cookie 恢复：回灌存档 Cookie 后刷新首页，确认登录态且账号没换人
    async fn try_restore(&self) -> Result<bool, BotError> {
        let cookies = match self.store.cookies() {
            Some(c) => c,
            None => return Ok(false),
        };

        self.page.goto(&self.flickr.url_root).await?;
        self.page.import_cookies(cookies).await?;
        self.page.goto(&self.flickr.url_root).await?;

        if !self.page.exists(SIGNED_IN_MARKER).await? {
            tracing::warn!("saved cookies no longer valid");
            return Ok(false);
        }

        // 存档身份与页面上的登录账号必须一致，换过账号就重新登录
        if let Some(expected) = self.store.user_contact_url() {
            let actual = self.resolve_own_profile().await?;
            if actual != expected {
                tracing::warn!(expected = %expected, actual = %actual, "signed-in account changed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 表单登录，成功后把身份与 Cookie 写回存档
    async fn authenticate(&self) -> Result<(), BotError> {
        let email = self
            .flickr
            .email
            .as_deref()
            .ok_or_else(|| BotError::Auth("Flickr email not configured".to_string()))?;
        let password = self
            .flickr
            .password
            .as_deref()
            .ok_or_else(|| BotError::Auth("Flickr password not configured".to_string()))?;

        tracing::debug!(url = %self.flickr.url_login, "form login");
        self.page.goto(&self.flickr.url_login).await?;
        self.page.click_if_present(COOKIE_BANNER_ACCEPT).await?;

        // Flickr 登录分两屏：先邮箱，后密码
        self.page.type_into(LOGIN_EMAIL_INPUT, email).await?;
        self.page.click(LOGIN_SUBMIT).await?;
        self.page.type_into(LOGIN_PASSWORD_INPUT, password).await?;
        self.page.click(LOGIN_SUBMIT).await?;

        self.page.goto(&self.flickr.url_root).await?;
        if !self.page.exists(SIGNED_IN_MARKER).await? {
            return Err(BotError::Auth("Login rejected by site".to_string()));
        }

        let profile = self.resolve_own_profile().await?;
        self.store.set_user_contact_url(profile)?;
        let cookies = self.page.export_cookies().await?;
        self.store.set_cookies(cookies)?;
        Ok(())
    }

    /// 登录后的收尾：关掉 Cookie 横幅，把最终 Cookie 刷回存档
    async fn post_auth_init(&self) -> Result<(), BotError> {
        if self.page.click_if_present(COOKIE_BANNER_ACCEPT).await? {
            tracing::debug!("cookie banner dismissed");
        }
        let cookies = self.page.export_cookies().await?;
        self.store.set_cookies(cookies)?;
        Ok(())
    }
}
