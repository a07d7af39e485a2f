//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FLICKRBOT__*` 覆盖（双下划线表示
//! 嵌套，如 `FLICKRBOT__FLICKR__EMAIL=me@example.com`）。账号密码只建议走
//! 环境变量，不要写进仓库里的 TOML。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub flickr: FlickrSection,
}

/// [bot] 段：任务表、循环与存档策略、PAUSE 区间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// 逗号分隔的任务令牌表，大小写不敏感
    #[serde(default = "default_tasks")]
    pub tasks: String,
    /// LOOP 回跳次数上限；0 或负数表示不限
    #[serde(default = "default_loop_task_limit")]
    pub loop_task_limit: i64,
    #[serde(default)]
    pub save_after_each_action: bool,
    #[serde(default = "default_true")]
    pub save_on_loop: bool,
    #[serde(default = "default_true")]
    pub save_on_end: bool,
    /// PAUSE / WAIT 的随机睡眠区间（整秒，双端含）
    #[serde(default = "default_pause_min_secs")]
    pub pause_min_secs: u64,
    #[serde(default = "default_pause_max_secs")]
    pub pause_max_secs: u64,
    /// 会话数据存档文件
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_tasks() -> String {
    "DETECTCONTACTSFOLLOWBACK,LOOPSTART,DETECTEXPLORED,DOCONTACTSFOLLOW,DOPHOTOSFAV,PAUSE,LOOP"
        .to_string()
}

fn default_loop_task_limit() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_pause_min_secs() -> u64 {
    600
}

fn default_pause_max_secs() -> u64 {
    1800
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/flickrbot.json")
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            tasks: default_tasks(),
            loop_task_limit: default_loop_task_limit(),
            save_after_each_action: false,
            save_on_loop: true,
            save_on_end: true,
            pause_min_secs: default_pause_min_secs(),
            pause_max_secs: default_pause_max_secs(),
            data_path: default_data_path(),
        }
    }
}

/// [browser] 段：本地启动或远程接入、窗口尺寸区间、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// 远程浏览器的调试地址（ws://…）；未设置时本地启动
    pub remote_server: Option<String>,
    /// 接入远程浏览器前的预热等待
    #[serde(default)]
    pub warmup_wait_ms: u64,
    /// 本地启动时窗口宽高在 [min, max] 内随机取，降低指纹一致性
    #[serde(default = "default_window_min_w")]
    pub window_min_w: u32,
    #[serde(default = "default_window_max_w")]
    pub window_max_w: u32,
    #[serde(default = "default_window_min_h")]
    pub window_min_h: u32,
    #[serde(default = "default_window_max_h")]
    pub window_max_h: u32,
    /// 等元素出现的默认超时（秒）
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    /// 浏览器空闲退出超时（秒），必须盖过最长的 PAUSE
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_window_min_w() -> u32 {
    1024
}

fn default_window_max_w() -> u32 {
    1920
}

fn default_window_min_h() -> u32 {
    768
}

fn default_window_max_h() -> u32 {
    1080
}

fn default_page_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    7200
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            remote_server: None,
            warmup_wait_ms: 0,
            window_min_w: default_window_min_w(),
            window_max_w: default_window_max_w(),
            window_min_h: default_window_min_h(),
            window_max_h: default_window_max_h(),
            page_timeout_secs: default_page_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// [flickr] 段：站点入口、登录凭据、检测与批量参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlickrSection {
    #[serde(default = "default_url_root")]
    pub url_root: String,
    #[serde(default = "default_url_login")]
    pub url_login: String,
    #[serde(default = "default_url_explore")]
    pub url_explore: String,
    /// 搜索地址模板，`{}` 处填关键词
    #[serde(default = "default_url_search")]
    pub url_search: String,
    /// 已关注联系人的最新照片流
    #[serde(default = "default_url_contacts")]
    pub url_contacts: String,
    /// 登录邮箱与密码，建议用 FLICKRBOT__FLICKR__EMAIL / __PASSWORD 注入
    pub email: Option<String>,
    pub password: Option<String>,
    /// SEARCHKEYWORDS 用的关键词，逗号分隔
    #[serde(default)]
    pub search_keywords: String,
    /// 单次 DOCONTACTSFOLLOW / DOCONTACTSUNFOLLOW 处理的联系人上限
    #[serde(default = "default_follow_batch_max")]
    pub follow_batch_max: usize,
    /// 单次 DOPHOTOSFAV / DOCONTACTSFAV 处理的照片上限
    #[serde(default = "default_fav_batch_max")]
    pub fav_batch_max: usize,
    /// 检测类动作在懒加载页面上往下滚几屏
    #[serde(default = "default_detect_scroll_screens")]
    pub detect_scroll_screens: u32,
    /// 批量点击之间的随机间隔（毫秒）
    #[serde(default = "default_click_min_ms")]
    pub click_min_ms: u64,
    #[serde(default = "default_click_max_ms")]
    pub click_max_ms: u64,
}

fn default_url_root() -> String {
    "https://www.flickr.com".to_string()
}

fn default_url_login() -> String {
    "https://identity.flickr.com/login".to_string()
}

fn default_url_explore() -> String {
    "https://www.flickr.com/explore".to_string()
}

fn default_url_search() -> String {
    "https://www.flickr.com/search/?text={}".to_string()
}

fn default_url_contacts() -> String {
    "https://www.flickr.com/photos/friends".to_string()
}

fn default_follow_batch_max() -> usize {
    20
}

fn default_fav_batch_max() -> usize {
    30
}

fn default_detect_scroll_screens() -> u32 {
    3
}

fn default_click_min_ms() -> u64 {
    1500
}

fn default_click_max_ms() -> u64 {
    4000
}

impl Default for FlickrSection {
    fn default() -> Self {
        Self {
            url_root: default_url_root(),
            url_login: default_url_login(),
            url_explore: default_url_explore(),
            url_search: default_url_search(),
            url_contacts: default_url_contacts(),
            email: None,
            password: None,
            search_keywords: String::new(),
            follow_batch_max: default_follow_batch_max(),
            fav_batch_max: default_fav_batch_max(),
            detect_scroll_screens: default_detect_scroll_screens(),
            click_min_ms: default_click_min_ms(),
            click_max_ms: default_click_max_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotSection::default(),
            browser: BrowserSection::default(),
            flickr: FlickrSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FLICKRBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FLICKRBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FLICKRBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_coherent() {
        let cfg = AppConfig::default();
        assert!(cfg.bot.tasks.contains("LOOPSTART"));
        assert!(cfg.bot.tasks.contains("LOOP"));
        assert_eq!(cfg.bot.loop_task_limit, 3);
        assert!(!cfg.bot.save_after_each_action);
        assert!(cfg.bot.save_on_loop);
        assert!(cfg.bot.save_on_end);
        assert!(cfg.bot.pause_min_secs <= cfg.bot.pause_max_secs);
        assert!(cfg.flickr.click_min_ms <= cfg.flickr.click_max_ms);
        assert!(cfg.browser.window_min_w <= cfg.browser.window_max_w);
        assert!(cfg.browser.window_min_h <= cfg.browser.window_max_h);
        // 空闲退出超时必须盖过最长的 PAUSE，否则睡一觉回来浏览器已经没了
        assert!(cfg.browser.idle_timeout_secs > cfg.bot.pause_max_secs);
        assert!(cfg.flickr.url_search.contains("{}"));
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_default();
        assert_eq!(cfg.bot.data_path, PathBuf::from("data/flickrbot.json"));
        assert!(cfg.flickr.email.is_none());
        assert!(cfg.flickr.password.is_none());
    }
}
