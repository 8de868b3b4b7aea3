//! No-op keep-alive for foreground processes

use async_trait::async_trait;

use crate::application::ports::{KeepAlive, KeepAliveError};

/// Keep-alive that does nothing; a foreground CLI needs no help staying up
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopKeepAlive;

#[async_trait]
impl KeepAlive for NoopKeepAlive {
    async fn foreground_needed(&self) -> Result<(), KeepAliveError> {
        Ok(())
    }

    async fn foreground_not_needed(&self) -> Result<(), KeepAliveError> {
        Ok(())
    }
}
