//! Headless Chrome 页面封装
//!
//! headless_chrome 是同步库，所有调用一律套 spawn_blocking，错误统一塌成
//! BotError::Browser。机器人全程复用同一个 Tab；Cookie 导入导出走
//! serde_json 值，存档侧不感知 CDP 的具体类型。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;
use serde_json::Value;

use crate::config::BrowserSection;
use crate::core::dump::PageProbe;
use crate::core::error::BotError;

/// 每次滚屏后等懒加载内容就位的时间
const SCROLL_SETTLE_MS: u64 = 400;

/// 导航后等页面脚本安顿的时间
const NAVIGATE_SETTLE_MS: u64 = 500;

/// 浏览器连接与常驻 Tab，打包放进 Option 以便 close 时整体取走
struct PageInner {
    _browser: Browser,
    tab: Arc<Tab>,
}

/// 单个常驻页面。内部句柄由 close 取走后置空，之后的页面操作报 Browser 错误。
pub struct FlickrPage {
    inner: Mutex<Option<PageInner>>,
}

impl FlickrPage {
    /// 启动或接入浏览器：
    /// - 未配置 remote_server 时本地启动，窗口尺寸在配置区间内随机取
    /// - 配置了 remote_server 时先等它预热，再按调试地址接入
    pub async fn open(cfg: &BrowserSection) -> Result<FlickrPage, BotError> {
        let cfg = cfg.clone();
        tokio::task::spawn_blocking(move || {
            let browser = match &cfg.remote_server {
                Some(server) => {
                    if cfg.warmup_wait_ms > 0 {
                        tracing::debug!(ms = cfg.warmup_wait_ms, "waiting for remote browser warm-up");
                        std::thread::sleep(Duration::from_millis(cfg.warmup_wait_ms));
                    }
                    Browser::connect(server.clone())
                        .map_err(|e| BotError::Browser(format!("Chrome connect failed: {}", e)))?
                }
                None => {
                    let (w, h) = random_window_size(&cfg);
                    tracing::debug!(width = w, height = h, "launching local browser");
                    let options = LaunchOptions {
                        window_size: Some((w, h)),
                        idle_browser_timeout: Duration::from_secs(cfg.idle_timeout_secs),
                        ..Default::default()
                    };
                    Browser::new(options)
                        .map_err(|e| BotError::Browser(format!("Chrome launch failed: {}", e)))?
                }
            };

            let tab = browser
                .new_tab()
                .map_err(|e| BotError::Browser(format!("Browser tab failed: {}", e)))?;
            tab.set_default_timeout(Duration::from_secs(cfg.page_timeout_secs));

            Ok::<_, BotError>(FlickrPage {
                inner: Mutex::new(Some(PageInner { _browser: browser, tab })),
            })
        })
        .await
        .map_err(|e| BotError::Browser(format!("Task join: {}", e)))?
    }

    /// 释放浏览器句柄。幂等：只有第一次调用真正释放，句柄随即置空。
    pub fn close(&self) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.take().is_some() {
            tracing::debug!("browser handle released");
        }
    }

    fn tab_handle(&self) -> Result<Arc<Tab>, BotError> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(inner) => Ok(inner.tab.clone()),
            None => Err(BotError::Browser("Browser handle already closed".to_string())),
        }
    }

    /// 在阻塞线程上跑一段同步的 Tab 操作
    async fn with_tab<T, F>(&self, f: F) -> Result<T, BotError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T, BotError> + Send + 'static,
    {
        let tab = self.tab_handle()?;
        tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| BotError::Browser(format!("Task join: {}", e)))?
    }

    /// 导航到 URL 并等 body 出现
    pub async fn goto(&self, url: &str) -> Result<(), BotError> {
        tracing::debug!(url = %url, "navigate");
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)
                .map_err(|e| BotError::Browser(format!("Navigate failed: {}", e)))?;
            tab.wait_for_element("body")
                .map_err(|e| BotError::Browser(format!("Page load failed: {}", e)))?;
            std::thread::sleep(Duration::from_millis(NAVIGATE_SETTLE_MS));
            Ok(())
        })
        .await
    }

    pub async fn url(&self) -> Result<String, BotError> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    /// 按 CSS 选择器收集页面上去重后的链接。
    /// 页面内 JS 直接回传 JSON 文本，规避 CDP 返回对象的形状差异。
    /// 选择器以双引号嵌进 JS，属性值一律用单引号写。
    pub async fn collect_links(&self, selector: &str) -> Result<Vec<String>, BotError> {
        let js = format!(
            r#"
            (function() {{
                const seen = new Set();
                for (const el of document.querySelectorAll("{}")) {{
                    if (el.href) seen.add(el.href);
                }}
                return JSON.stringify(Array.from(seen));
            }})()
            "#,
            selector
        );
        self.with_tab(move |tab| {
            let result = tab
                .evaluate(&js, false)
                .map_err(|e| BotError::Browser(format!("Collect links failed: {}", e)))?;
            let raw = match result.value {
                Some(Value::String(s)) => s,
                _ => return Err(BotError::Browser("Collect links returned no value".to_string())),
            };
            serde_json::from_str(&raw)
                .map_err(|e| BotError::Browser(format!("Collect links parse failed: {}", e)))
        })
        .await
    }

    /// 等元素出现后点击
    pub async fn click(&self, selector: &str) -> Result<(), BotError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let el = tab
                .wait_for_element(&selector)
                .map_err(|e| BotError::Browser(format!("Element not found: {}", e)))?;
            el.click()
                .map_err(|e| BotError::Browser(format!("Click failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    /// 元素在场就点击并返回 true，不在场返回 false 不算错
    pub async fn click_if_present(&self, selector: &str) -> Result<bool, BotError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| match tab.find_element(&selector) {
            Ok(el) => {
                el.click()
                    .map_err(|e| BotError::Browser(format!("Click failed: {}", e)))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        })
        .await
    }

    /// 等输入框出现，点击聚焦后敲入文本
    pub async fn type_into(&self, selector: &str, text: &str) -> Result<(), BotError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            let el = tab
                .wait_for_element(&selector)
                .map_err(|e| BotError::Browser(format!("Element not found: {}", e)))?;
            el.click()
                .map_err(|e| BotError::Browser(format!("Focus failed: {}", e)))?;
            tab.type_str(&text)
                .map_err(|e| BotError::Browser(format!("Type failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    pub async fn exists(&self, selector: &str) -> Result<bool, BotError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| Ok(tab.find_element(&selector).is_ok()))
            .await
    }

    /// 懒加载页面往下滚若干屏，触发更多内容装载
    pub async fn scroll_down(&self, screens: u32) -> Result<(), BotError> {
        self.with_tab(move |tab| {
            for _ in 0..screens {
                tab.evaluate("window.scrollBy(0, window.innerHeight)", false)
                    .map_err(|e| BotError::Browser(format!("Scroll failed: {}", e)))?;
                std::thread::sleep(Duration::from_millis(SCROLL_SETTLE_MS));
            }
            Ok(())
        })
        .await
    }

    /// 导出当前会话的全部 Cookie 为不透明 JSON 值
    pub async fn export_cookies(&self) -> Result<Value, BotError> {
        self.with_tab(|tab| {
            let cookies = tab
                .get_cookies()
                .map_err(|e| BotError::Browser(format!("Get cookies failed: {}", e)))?;
            serde_json::to_value(cookies)
                .map_err(|e| BotError::Browser(format!("Cookie encode failed: {}", e)))
        })
        .await
    }

    /// 回灌存档里的 Cookie
    pub async fn import_cookies(&self, cookies: Value) -> Result<(), BotError> {
        self.with_tab(move |tab| {
            let params: Vec<CookieParam> = serde_json::from_value(cookies)
                .map_err(|e| BotError::Browser(format!("Cookie decode failed: {}", e)))?;
            tab.set_cookies(params)
                .map_err(|e| BotError::Browser(format!("Set cookies failed: {}", e)))?;
            Ok(())
        })
        .await
    }
}

impl Drop for FlickrPage {
    fn drop(&mut self) {
        self.close();
    }
}

fn random_window_size(cfg: &BrowserSection) -> (u32, u32) {
    let mut rng = rand::thread_rng();
    let w = if cfg.window_max_w > cfg.window_min_w {
        rng.gen_range(cfg.window_min_w..=cfg.window_max_w)
    } else {
        cfg.window_min_w
    };
    let h = if cfg.window_max_h > cfg.window_min_h {
        rng.gen_range(cfg.window_min_h..=cfg.window_max_h)
    } else {
        cfg.window_min_h
    };
    (w, h)
}

#[async_trait]
impl PageProbe for FlickrPage {
    async fn current_url(&self) -> Result<String, BotError> {
        self.url().await
    }

    async fn page_title(&self) -> Result<String, BotError> {
        self.with_tab(|tab| {
            tab.get_title()
                .map_err(|e| BotError::Browser(format!("Get title failed: {}", e)))
        })
        .await
    }

    async fn page_source(&self) -> Result<String, BotError> {
        self.with_tab(|tab| {
            tab.get_content()
                .map_err(|e| BotError::Browser(format!("Get content failed: {}", e)))
        })
        .await
    }
}
