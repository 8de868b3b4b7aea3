//! Keep-alive through desktop notifications
//!
//! Announces when capture starts and when it stops, so the user always knows
//! the microphone is live.

use async_trait::async_trait;

use crate::application::ports::{KeepAlive, KeepAliveError, NotificationIcon, Notifier};

const TITLE: &str = "flac-recorder";

/// Posts a notification on every change of capture activity
pub struct NotifierKeepAlive<N: Notifier> {
    notifier: N,
}

impl<N: Notifier> NotifierKeepAlive<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl<N: Notifier> KeepAlive for NotifierKeepAlive<N> {
    async fn foreground_needed(&self) -> Result<(), KeepAliveError> {
        self.notifier
            .notify(TITLE, "Recording in progress", NotificationIcon::Recording)
            .await
            .map_err(|e| KeepAliveError::Failed(e.to_string()))
    }

    async fn foreground_not_needed(&self) -> Result<(), KeepAliveError> {
        self.notifier
            .notify(TITLE, "Microphone released", NotificationIcon::Paused)
            .await
            .map_err(|e| KeepAliveError::Failed(e.to_string()))
    }
}
