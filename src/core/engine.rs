//! 任务执行引擎
//!
//! 对编译好的 TaskProgram 持整数游标顺序执行：动作令牌经 ActionRegistry
//! 分发，控制令牌（SAVE / PAUSE / LOOPSTART / LOOP）在引擎内就地处理。
//! 每步结束后由统一的存档策略判定是否立即落盘；LOOP 受次数预算约束，
//! 防止任务表无界运行。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::actions::ActionRegistry;
use crate::core::error::BotError;
use crate::core::program::{TaskProgram, TaskToken};

/// 登录会话的生命周期接口，由具体站点的会话层实现
#[async_trait]
pub trait SessionFlow: Send + Sync {
    /// 已登录用户的标识（个人联系页 URL）；None 表示会话从未建立过
    fn logged_user(&self) -> Option<String>;

    /// 用存档里的 Cookie 恢复登录态；Ok(false) 表示凭据已失效，应走全新登录
    async fn try_restore(&self) -> Result<bool, BotError>;

    /// 全新登录
    async fn authenticate(&self) -> Result<(), BotError>;

    /// 登录后的初始化（核对身份 URL、预热页面状态）
    async fn post_auth_init(&self) -> Result<(), BotError>;
}

/// 会话数据落盘的唯一出口；引擎和转储器只认这个窄接口
pub trait Checkpoint: Send + Sync {
    fn checkpoint(&self) -> Result<(), BotError>;
}

/// 存档策略：三种落盘时机，可按配置独立开关
#[derive(Clone, Copy, Debug, Default)]
pub struct SavePolicy {
    /// 每执行完一个动作令牌就落盘
    pub after_each_action: bool,
    /// 每次 LOOP 真正回跳时落盘
    pub on_loop: bool,
    /// 程序自然走完后落盘
    pub on_end: bool,
}

/// PAUSE 的随机睡眠区间（整秒，双端含）
#[derive(Clone, Copy, Debug)]
pub struct PauseRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl PauseRange {
    /// 取一次随机睡眠秒数；区间无效时退化为下界
    pub fn sample_secs(&self) -> u64 {
        if self.max_secs <= self.min_secs {
            return self.min_secs;
        }
        rand::thread_rng().gen_range(self.min_secs..=self.max_secs)
    }
}

/// LOOP 次数预算
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopBudget {
    Unlimited,
    Limited(u32),
}

impl LoopBudget {
    /// 配置值不大于 0 表示不限次数；超出 u32 范围的上限饱和到 u32::MAX
    pub fn from_limit(limit: i64) -> LoopBudget {
        if limit <= 0 {
            LoopBudget::Unlimited
        } else {
            LoopBudget::Limited(limit.min(u32::MAX as i64) as u32)
        }
    }

    /// 消耗一次回跳机会；仍有余量时返回 true。
    /// 上限 N 意味着 LOOPSTART..LOOP 区间最多执行 N+1 遍（首遍不计预算）。
    pub fn try_consume(&mut self) -> bool {
        match self {
            LoopBudget::Unlimited => true,
            LoopBudget::Limited(0) => false,
            LoopBudget::Limited(n) => {
                *n -= 1;
                true
            }
        }
    }

    fn remaining(&self) -> Option<u32> {
        match self {
            LoopBudget::Unlimited => None,
            LoopBudget::Limited(n) => Some(*n),
        }
    }
}

/// 引擎可变状态：program 本身不可变，跑动过程只推进这两个字段
#[derive(Clone, Copy, Debug)]
pub struct EngineState {
    pub cursor: usize,
    pub budget: LoopBudget,
}

/// 单步执行的归类结果，存档判定只看这个值
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// 动作令牌执行成功
    Action,
    /// SAVE 令牌
    Save,
    /// 不参与存档判定的控制步（PAUSE / LOOPSTART）
    Continue,
    /// LOOP 消耗预算并回跳
    LoopFired,
    /// LOOP 预算耗尽，顺序继续
    LoopExhausted,
    /// 未知令牌，已记错误日志后跳过
    Unknown,
}

impl SavePolicy {
    /// 某步之后是否应当落盘。纯函数，便于单测穷举。
    pub fn due_after(&self, outcome: StepOutcome) -> bool {
        match outcome {
            StepOutcome::Continue => false,
            StepOutcome::Save => true,
            StepOutcome::LoopFired => self.after_each_action || self.on_loop,
            StepOutcome::Action | StepOutcome::LoopExhausted | StepOutcome::Unknown => {
                self.after_each_action
            }
        }
    }
}

/// 任务执行引擎本体
pub struct TaskEngine {
    program: TaskProgram,
    actions: ActionRegistry,
    session: Arc<dyn SessionFlow>,
    checkpoint: Arc<dyn Checkpoint>,
    policy: SavePolicy,
    pause: PauseRange,
    state: EngineState,
}

impl TaskEngine {
    pub fn new(
        program: TaskProgram,
        actions: ActionRegistry,
        session: Arc<dyn SessionFlow>,
        checkpoint: Arc<dyn Checkpoint>,
        policy: SavePolicy,
        pause: PauseRange,
        budget: LoopBudget,
    ) -> TaskEngine {
        TaskEngine {
            program,
            actions,
            session,
            checkpoint,
            policy,
            pause,
            state: EngineState { cursor: 0, budget },
        }
    }

    /// 跑完整个任务程序：先建立登录会话并落盘一次，然后逐步执行到表尾。
    /// 动作失败原样上抛，由调用方决定转储与退出码。
    pub async fn run(&mut self) -> Result<(), BotError> {
        tracing::info!("## LOGGING...");
        self.establish_session().await?;

        // 登录后强制落盘一次，保住新鲜 Cookie
        self.checkpoint.checkpoint()?;

        tracing::info!("## RUNNING...");
        while let Some(raw) = self.program.token(self.state.cursor).map(str::to_owned) {
            tracing::info!(task = %raw, "# task");
            let outcome = self.step(&raw).await?;

            self.state.cursor = match outcome {
                StepOutcome::LoopFired => self.program.loop_target(),
                _ => self.state.cursor + 1,
            };

            if self.policy.due_after(outcome) {
                self.checkpoint.checkpoint()?;
            }
        }

        if self.policy.on_end {
            self.checkpoint.checkpoint()?;
        }
        tracing::info!("## ENDED OK");
        Ok(())
    }

    /// 开跑前置条件：有存档先试恢复，失效或无存档则全新登录
    async fn establish_session(&self) -> Result<(), BotError> {
        let restored = match self.session.logged_user() {
            Some(_) => self.session.try_restore().await?,
            None => false,
        };
        if !restored {
            self.session.authenticate().await?;
        }
        match self.session.logged_user() {
            Some(user) => tracing::info!(user = %user, "logged user"),
            None => return Err(BotError::Auth("authentication left no logged user".to_string())),
        }
        self.session.post_auth_init().await?;
        Ok(())
    }

    async fn step(&mut self, raw: &str) -> Result<StepOutcome, BotError> {
        match TaskToken::parse(raw) {
            Some(TaskToken::Action(kind)) => match self.actions.get(kind) {
                Some(action) => {
                    action.run().await?;
                    Ok(StepOutcome::Action)
                }
                // 已知拼写但没有注册实现，按未知令牌同样处置
                None => {
                    tracing::error!(task = %raw, "unknown bot task");
                    Ok(StepOutcome::Unknown)
                }
            },
            Some(TaskToken::Save) => Ok(StepOutcome::Save),
            Some(TaskToken::Pause) => {
                self.pause_between_tasks().await;
                Ok(StepOutcome::Continue)
            }
            Some(TaskToken::LoopStart) => Ok(StepOutcome::Continue),
            Some(TaskToken::Loop) => {
                if self.state.budget.try_consume() {
                    if let Some(remaining) = self.state.budget.remaining() {
                        tracing::debug!(remaining, "loop budget");
                    }
                    Ok(StepOutcome::LoopFired)
                } else {
                    tracing::debug!("loop limit reached");
                    Ok(StepOutcome::LoopExhausted)
                }
            }
            None => {
                tracing::error!(task = %raw, "unknown bot task");
                Ok(StepOutcome::Unknown)
            }
        }
    }

    async fn pause_between_tasks(&self) {
        let secs = self.pause.sample_secs();
        tracing::debug!(seconds = secs, "pausing");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::core::program::ActionKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingAction {
        kind: ActionKind,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Action for CountingAction {
        fn kind(&self) -> ActionKind {
            self.kind
        }
        async fn run(&self) -> Result<(), BotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockSession {
        user: Mutex<Option<String>>,
        restore_ok: bool,
        restore_calls: AtomicUsize,
        auth_calls: AtomicUsize,
    }

    impl MockSession {
        fn fresh() -> Self {
            MockSession {
                user: Mutex::new(None),
                restore_ok: false,
                restore_calls: AtomicUsize::new(0),
                auth_calls: AtomicUsize::new(0),
            }
        }

        fn returning(user: &str, restore_ok: bool) -> Self {
            MockSession {
                user: Mutex::new(Some(user.to_string())),
                restore_ok,
                restore_calls: AtomicUsize::new(0),
                auth_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionFlow for MockSession {
        fn logged_user(&self) -> Option<String> {
            self.user.lock().unwrap().clone()
        }
        async fn try_restore(&self) -> Result<bool, BotError> {
            self.restore_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.restore_ok)
        }
        async fn authenticate(&self) -> Result<(), BotError> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            *self.user.lock().unwrap() = Some("https://www.flickr.com/photos/tester/".to_string());
            Ok(())
        }
        async fn post_auth_init(&self) -> Result<(), BotError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockCheckpoint {
        saves: AtomicUsize,
    }

    impl Checkpoint for MockCheckpoint {
        fn checkpoint(&self) -> Result<(), BotError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn no_pause() -> PauseRange {
        PauseRange { min_secs: 0, max_secs: 0 }
    }

    fn engine_with(
        program: &str,
        actions: ActionRegistry,
        session: Arc<MockSession>,
        checkpoint: Arc<MockCheckpoint>,
        policy: SavePolicy,
        budget: LoopBudget,
    ) -> TaskEngine {
        TaskEngine::new(
            TaskProgram::parse(program),
            actions,
            session,
            checkpoint,
            policy,
            no_pause(),
            budget,
        )
    }

    #[test]
    fn test_loop_budget_consumption() {
        let mut b = LoopBudget::from_limit(2);
        assert!(b.try_consume());
        assert!(b.try_consume());
        assert!(!b.try_consume());
        assert!(!b.try_consume());

        let mut u = LoopBudget::from_limit(-1);
        for _ in 0..100 {
            assert!(u.try_consume());
        }
        // 0 同样落在不限档
        assert_eq!(LoopBudget::from_limit(0), LoopBudget::Unlimited);
        // 超出 u32 的上限饱和，不回绕
        assert_eq!(
            LoopBudget::from_limit(u32::MAX as i64 + 2),
            LoopBudget::Limited(u32::MAX)
        );
    }

    #[test]
    fn test_save_policy_table() {
        let none = SavePolicy::default();
        assert!(!none.due_after(StepOutcome::Action));
        assert!(none.due_after(StepOutcome::Save));
        assert!(!none.due_after(StepOutcome::Continue));
        assert!(!none.due_after(StepOutcome::LoopFired));
        assert!(!none.due_after(StepOutcome::LoopExhausted));
        assert!(!none.due_after(StepOutcome::Unknown));

        let each = SavePolicy { after_each_action: true, ..SavePolicy::default() };
        assert!(each.due_after(StepOutcome::Action));
        assert!(each.due_after(StepOutcome::Unknown));
        assert!(each.due_after(StepOutcome::LoopFired));
        assert!(each.due_after(StepOutcome::LoopExhausted));
        assert!(!each.due_after(StepOutcome::Continue));

        let on_loop = SavePolicy { on_loop: true, ..SavePolicy::default() };
        assert!(on_loop.due_after(StepOutcome::LoopFired));
        assert!(!on_loop.due_after(StepOutcome::LoopExhausted));
        assert!(!on_loop.due_after(StepOutcome::Action));
    }

    #[tokio::test]
    async fn test_loop_limit_runs_region_n_plus_one_times() {
        let action = Arc::new(CountingAction {
            kind: ActionKind::DetectExplored,
            calls: AtomicUsize::new(0),
        });
        let mut actions = ActionRegistry::new();
        actions.register(action.clone());

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "LOOPSTART,DETECTEXPLORED,LOOP",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::from_limit(3),
        );

        engine.run().await.unwrap();
        assert_eq!(action.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_loop_without_marker_restarts_from_program_start() {
        let action = Arc::new(CountingAction {
            kind: ActionKind::DetectExplored,
            calls: AtomicUsize::new(0),
        });
        let mut actions = ActionRegistry::new();
        actions.register(action.clone());

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "DETECTEXPLORED,LOOP",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::from_limit(1),
        );

        engine.run().await.unwrap();
        // 无 LOOPSTART 时回到表头，区间同样执行 1+1 遍
        assert_eq!(action.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unlimited_loop_keeps_firing_until_fault() {
        struct FailAfter {
            calls: AtomicUsize,
            limit: usize,
        }

        #[async_trait]
        impl Action for FailAfter {
            fn kind(&self) -> ActionKind {
                ActionKind::DetectExplored
            }
            async fn run(&self) -> Result<(), BotError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= self.limit {
                    Err(BotError::Action("injected stop".to_string()))
                } else {
                    Ok(())
                }
            }
        }

        let action = Arc::new(FailAfter { calls: AtomicUsize::new(0), limit: 5 });
        let mut actions = ActionRegistry::new();
        actions.register(action.clone());

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "LOOPSTART,DETECTEXPLORED,LOOP",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::from_limit(0),
        );

        // 预算不限时循环不会自己停，终止靠第 5 轮注入的失败
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, BotError::Action(_)));
        assert_eq!(action.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unknown_token_is_skipped_and_run_continues() {
        let action = Arc::new(CountingAction {
            kind: ActionKind::DoContactsFollow,
            calls: AtomicUsize::new(0),
        });
        let mut actions = ActionRegistry::new();
        actions.register(action.clone());

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "NOPE,DOCONTACTSFOLLOW",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_known_kind_without_handler_is_skipped() {
        let action = Arc::new(CountingAction {
            kind: ActionKind::DoContactsFollow,
            calls: AtomicUsize::new(0),
        });
        let mut actions = ActionRegistry::new();
        actions.register(action.clone());

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        // DOPHOTOSFAV 拼写合法但注册表里没有实现
        let mut engine = engine_with(
            "DOPHOTOSFAV,DOCONTACTSFOLLOW",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_authenticates_without_restore() {
        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "",
            ActionRegistry::new(),
            session.clone(),
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        assert_eq!(session.restore_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restored_session_skips_authenticate() {
        let session = Arc::new(MockSession::returning("https://www.flickr.com/photos/a/", true));
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "",
            ActionRegistry::new(),
            session.clone(),
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        assert_eq!(session.restore_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.auth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cookies_fall_back_to_fresh_login() {
        let session = Arc::new(MockSession::returning("https://www.flickr.com/photos/a/", false));
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "",
            ActionRegistry::new(),
            session.clone(),
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        assert_eq!(session.restore_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_token_and_end_of_run_checkpoints() {
        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "SAVE,SAVE",
            ActionRegistry::new(),
            session,
            checkpoint.clone(),
            SavePolicy { on_end: true, ..SavePolicy::default() },
            LoopBudget::Unlimited,
        );

        engine.run().await.unwrap();
        // 登录后 1 次 + SAVE 两次 + 收尾 1 次
        assert_eq!(checkpoint.saves.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_action_error_propagates() {
        struct FailingAction;

        #[async_trait]
        impl Action for FailingAction {
            fn kind(&self) -> ActionKind {
                ActionKind::DoPhotosFav
            }
            async fn run(&self) -> Result<(), BotError> {
                Err(BotError::Action("fav click failed".to_string()))
            }
        }

        let mut actions = ActionRegistry::new();
        actions.register(Arc::new(FailingAction));

        let session = Arc::new(MockSession::fresh());
        let checkpoint = Arc::new(MockCheckpoint::default());
        let mut engine = engine_with(
            "DOPHOTOSFAV",
            actions,
            session,
            checkpoint,
            SavePolicy::default(),
            LoopBudget::Unlimited,
        );

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, BotError::Action(_)));
    }
}
