//! 失败现场转储
//!
//! 动作抛错后尽力留痕：抓取当前页面的 URL / 标题 / 源码拼成一段记录写进
//! 调试日志，抓取中途失败就在已有内容后面补一行占位说明。随后再试着落盘
//! 一次会话数据，这次落盘的错误只记日志不上抛，避免在错误路径上二次炸掉。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::engine::Checkpoint;
use crate::core::error::BotError;

/// 转储器对页面状态的只读探针，由浏览器层实现
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn current_url(&self) -> Result<String, BotError>;
    async fn page_title(&self) -> Result<String, BotError>;
    async fn page_source(&self) -> Result<String, BotError>;
}

pub struct DiagnosticDumper {
    probe: Arc<dyn PageProbe>,
    checkpoint: Arc<dyn Checkpoint>,
}

impl DiagnosticDumper {
    pub fn new(probe: Arc<dyn PageProbe>, checkpoint: Arc<dyn Checkpoint>) -> DiagnosticDumper {
        DiagnosticDumper { probe, checkpoint }
    }

    /// 失败后的现场转储。任何内部错误都被吞掉，本函数保证不再失败。
    pub async fn dump_after_failure(&self) {
        let record = self.capture_record().await;
        tracing::debug!(dump = %record, "last page context");

        if let Err(e) = self.checkpoint.checkpoint() {
            tracing::debug!(error = %e, "post-failure checkpoint failed");
        }
    }

    /// 逐段抓取页面现场；中途失败保留已抓到的部分并追加占位行
    async fn capture_record(&self) -> String {
        let mut record = String::new();
        if self.try_capture(&mut record).await.is_err() {
            record.push_str("# Couldn't dump last page context\n");
        }
        record
    }

    async fn try_capture(&self, record: &mut String) -> Result<(), BotError> {
        record.push_str("# Url\n");
        record.push_str(&self.probe.current_url().await?);
        record.push('\n');

        record.push_str("# Title\n");
        record.push_str(&self.probe.page_title().await?);
        record.push('\n');

        record.push_str("# Page\n");
        record.push_str(&self.probe.page_source().await?);
        record.push('\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProbe {
        fail_title: bool,
    }

    #[async_trait]
    impl PageProbe for MockProbe {
        async fn current_url(&self) -> Result<String, BotError> {
            Ok("https://www.flickr.com/explore".to_string())
        }
        async fn page_title(&self) -> Result<String, BotError> {
            if self.fail_title {
                Err(BotError::Browser("tab gone".to_string()))
            } else {
                Ok("Explore".to_string())
            }
        }
        async fn page_source(&self) -> Result<String, BotError> {
            Ok("<html></html>".to_string())
        }
    }

    struct MockCheckpoint {
        saves: AtomicUsize,
        fail: bool,
    }

    impl Checkpoint for MockCheckpoint {
        fn checkpoint(&self) -> Result<(), BotError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BotError::Checkpoint("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_full_capture_contains_all_sections() {
        let dumper = DiagnosticDumper::new(
            Arc::new(MockProbe { fail_title: false }),
            Arc::new(MockCheckpoint { saves: AtomicUsize::new(0), fail: false }),
        );
        let record = dumper.capture_record().await;
        assert!(record.contains("# Url\nhttps://www.flickr.com/explore\n"));
        assert!(record.contains("# Title\nExplore\n"));
        assert!(record.contains("# Page\n<html></html>\n"));
        assert!(!record.contains("Couldn't dump"));
    }

    #[tokio::test]
    async fn test_partial_capture_keeps_prefix_and_adds_placeholder() {
        let dumper = DiagnosticDumper::new(
            Arc::new(MockProbe { fail_title: true }),
            Arc::new(MockCheckpoint { saves: AtomicUsize::new(0), fail: false }),
        );
        let record = dumper.capture_record().await;
        // URL 段已经抓到，标题值缺失，占位行收尾
        assert!(record.contains("# Url\nhttps://www.flickr.com/explore\n"));
        assert!(record.contains("# Title\n"));
        assert!(!record.contains("Explore"));
        assert!(record.ends_with("# Couldn't dump last page context\n"));
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_swallowed() {
        let checkpoint = Arc::new(MockCheckpoint { saves: AtomicUsize::new(0), fail: true });
        let dumper = DiagnosticDumper::new(
            Arc::new(MockProbe { fail_title: false }),
            checkpoint.clone(),
        );
        // 不应 panic 也不应返回错误
        dumper.dump_after_failure().await;
        assert_eq!(checkpoint.saves.load(Ordering::SeqCst), 1);
    }
}
