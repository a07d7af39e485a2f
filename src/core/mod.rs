//! 核心层：任务程序编译、执行引擎、失败转储与统一错误

pub mod dump;
pub mod engine;
pub mod error;
pub mod program;

pub use dump::{DiagnosticDumper, PageProbe};
pub use engine::{Checkpoint, LoopBudget, PauseRange, SavePolicy, SessionFlow, StepOutcome, TaskEngine};
pub use error::BotError;
pub use program::{ActionKind, TaskProgram, TaskToken};
