//! 动作注册表
//!
//! 站点操作统一实现 Action trait（kind / run），由 ActionRegistry 按令牌种类
//! 注册与查找。动作不带参数也不返回值，只改站点状态或会话数据，引擎据此
//! 把任务表令牌分发到这里。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::BotError;
use crate::core::program::ActionKind;

/// 站点动作：对应任务表里的一个动作令牌
#[async_trait]
pub trait Action: Send + Sync {
    /// 本动作响应的令牌种类
    fn kind(&self) -> ActionKind;

    /// 执行动作；失败上抛，由引擎决定是否终止整轮运行
    async fn run(&self) -> Result<(), BotError>;
}

/// 动作注册表：按 ActionKind 存储 Arc<dyn Action>
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> ActionRegistry {
        ActionRegistry::default()
    }

    /// 注册动作；同种类重复注册时后注册者生效
    pub fn register(&mut self, action: Arc<dyn Action>) {
        let kind = action.kind();
        tracing::debug!(action = kind.token(), "register action");
        self.actions.insert(kind, action);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn Action>> {
        self.actions.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 已注册的令牌文本列表（按字母序），启动日志用
    pub fn registered_tokens(&self) -> Vec<&'static str> {
        let mut tokens: Vec<_> = self.actions.keys().map(|k| k.token()).collect();
        tokens.sort_unstable();
        tokens
    }
}
