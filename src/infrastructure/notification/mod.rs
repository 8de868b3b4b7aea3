//! Notification infrastructure module
//!
//! Provides cross-platform notification support using notify-rust (primary)
//! or the notify-send tool as fallback.

mod notify_rust;
mod notify_send;

pub use notify_rust::NotifyRustNotifier;
pub use notify_send::NotifySendNotifier;

use crate::application::ports::Notifier;

/// Application name shown by notification servers
pub const APP_NAME: &str = "flac-recorder";

/// Create the default notifier for the current platform
///
/// Uses notify-rust (cross-platform) unless `prefer_notify_send` is set.
pub fn create_notifier(prefer_notify_send: bool) -> Box<dyn Notifier> {
    if prefer_notify_send {
        Box::new(NotifySendNotifier::new())
    } else {
        Box::new(NotifyRustNotifier::new())
    }
}
