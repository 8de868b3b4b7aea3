//! Keep-alive port interface

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum KeepAliveError {
    #[error("Keep-alive request failed: {0}")]
    Failed(String),
}

/// Port for keeping the process alive while audio is captured.
///
/// `foreground_needed` is called on every entry into recording and
/// `foreground_not_needed` on every exit from it, paired one to one.
#[async_trait]
pub trait KeepAlive: Send + Sync {
    async fn foreground_needed(&self) -> Result<(), KeepAliveError>;

    async fn foreground_not_needed(&self) -> Result<(), KeepAliveError>;
}

#[async_trait]
impl KeepAlive for Box<dyn KeepAlive> {
    async fn foreground_needed(&self) -> Result<(), KeepAliveError> {
        self.as_ref().foreground_needed().await
    }

    async fn foreground_not_needed(&self) -> Result<(), KeepAliveError> {
        self.as_ref().foreground_not_needed().await
    }
}
