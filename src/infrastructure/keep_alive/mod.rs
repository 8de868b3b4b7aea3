//! Keep-alive adapters

mod noop;
mod notify;

pub use noop::NoopKeepAlive;
pub use notify::NotifierKeepAlive;
