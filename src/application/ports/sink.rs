//! Output sink port interfaces

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::audio::EncodedChunk;

/// Output errors
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Couldn't prepare output at {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("Failed to write output: {0}")]
    Write(String),
}

/// Destination for encoded bytes, written in delivery order
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Port for creating output destinations
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Create (or truncate) the destination, including missing parent
    /// directories
    async fn open(&self, path: &Path) -> Result<Box<dyn ChunkSink>, SinkError>;
}
