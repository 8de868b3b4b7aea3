//! Output file adapters

mod file_sink;

pub use file_sink::{FileSink, FsOutputStore};
