//! 任务程序与令牌
//!
//! 从逗号分隔的配置串编译出有序的任务令牌序列（大写化、去空白、丢弃空项）。
//! 加载阶段不校验令牌合法性：合法性由引擎在执行到该步时惰性判定，
//! 这样含未知令牌的任务表仍能装载并尽量跑完其余步骤。

/// 控制令牌字面量（历史线上格式，大小写不敏感；`WAIT` 是 `PAUSE` 的别名）
const SAVE_TOKEN: &str = "SAVE";
const PAUSE_TOKEN: &str = "PAUSE";
const WAIT_TOKEN: &str = "WAIT";
const LOOP_START_TOKEN: &str = "LOOPSTART";
const LOOP_TOKEN: &str = "LOOP";

/// 动作令牌：引擎通过 ActionRegistry 分发给外部协作者的封闭集合
///
/// `…_PHOTOSSONLY` 的双 S 拼写是线上历史格式，保持不变以兼容既有任务表。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    DetectContactsFollowBack,
    DetectContactsUnfollowBack,
    DetectExplored,
    DetectExploredContactsOnly,
    DetectExploredPhotosOnly,
    SearchKeywords,
    SearchKeywordsContactsOnly,
    SearchKeywordsPhotosOnly,
    DoContactsFollow,
    DoContactsUnfollow,
    DoContactsFav,
    DoPhotosFav,
    DetectRecentContactPhotos,
}

impl ActionKind {
    /// 全部动作令牌，注册表装配时用
    pub const ALL: [ActionKind; 13] = [
        ActionKind::DetectContactsFollowBack,
        ActionKind::DetectContactsUnfollowBack,
        ActionKind::DetectExplored,
        ActionKind::DetectExploredContactsOnly,
        ActionKind::DetectExploredPhotosOnly,
        ActionKind::SearchKeywords,
        ActionKind::SearchKeywordsContactsOnly,
        ActionKind::SearchKeywordsPhotosOnly,
        ActionKind::DoContactsFollow,
        ActionKind::DoContactsUnfollow,
        ActionKind::DoContactsFav,
        ActionKind::DoPhotosFav,
        ActionKind::DetectRecentContactPhotos,
    ];

    /// 该动作在任务表中的令牌文本
    pub fn token(&self) -> &'static str {
        match self {
            ActionKind::DetectContactsFollowBack => "DETECTCONTACTSFOLLOWBACK",
            ActionKind::DetectContactsUnfollowBack => "DETECTCONTACTSUNFOLLOWBACK",
            ActionKind::DetectExplored => "DETECTEXPLORED",
            ActionKind::DetectExploredContactsOnly => "DETECTEXPLORED_CONTACTSONLY",
            ActionKind::DetectExploredPhotosOnly => "DETECTEXPLORED_PHOTOSSONLY",
            ActionKind::SearchKeywords => "SEARCHKEYWORDS",
            ActionKind::SearchKeywordsContactsOnly => "SEARCHKEYWORDS_CONTACTSONLY",
            ActionKind::SearchKeywordsPhotosOnly => "SEARCHKEYWORDS_PHOTOSSONLY",
            ActionKind::DoContactsFollow => "DOCONTACTSFOLLOW",
            ActionKind::DoContactsUnfollow => "DOCONTACTSUNFOLLOW",
            ActionKind::DoContactsFav => "DOCONTACTSFAV",
            ActionKind::DoPhotosFav => "DOPHOTOSFAV",
            ActionKind::DetectRecentContactPhotos => "DETECTRECENTCONTACTPHOTOS",
        }
    }

    /// 按规范化后的令牌文本反查；未知令牌返回 None
    pub fn parse(token: &str) -> Option<ActionKind> {
        Self::ALL.iter().copied().find(|k| k.token() == token)
    }
}

/// 一步任务令牌：动作或控制
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskToken {
    Action(ActionKind),
    Save,
    Pause,
    LoopStart,
    Loop,
}

impl TaskToken {
    /// 解析一个规范化（大写、无空白）令牌；未知返回 None，由引擎按步报告
    pub fn parse(token: &str) -> Option<TaskToken> {
        match token {
            SAVE_TOKEN => Some(TaskToken::Save),
            PAUSE_TOKEN | WAIT_TOKEN => Some(TaskToken::Pause),
            LOOP_START_TOKEN => Some(TaskToken::LoopStart),
            LOOP_TOKEN => Some(TaskToken::Loop),
            other => ActionKind::parse(other).map(TaskToken::Action),
        }
    }
}

/// 任务程序：装载后不可变的令牌序列，引擎只持有整数游标读取
#[derive(Clone, Debug, Default)]
pub struct TaskProgram {
    tokens: Vec<String>,
}

impl TaskProgram {
    /// 从逗号分隔串编译：逐项 trim + 大写化，空项丢弃。此处不校验合法性。
    pub fn parse(raw: &str) -> TaskProgram {
        let tokens = raw
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        TaskProgram { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 第 index 步的原始令牌文本
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// LOOP 的跳转目标：从头找第一个 LOOPSTART，落点在标记之后；
    /// 无标记时返回 0（程序开头），作为安全续行而非越界错误。
    pub fn loop_target(&self) -> usize {
        self.tokens
            .iter()
            .position(|t| t == LOOP_START_TOKEN)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}
