//! Encoded output written to the local filesystem

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::application::ports::{ChunkSink, OutputStore, SinkError};
use crate::domain::audio::EncodedChunk;

/// Creates output files, truncating existing ones
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOutputStore;

impl FsOutputStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputStore for FsOutputStore {
    async fn open(&self, path: &Path) -> Result<Box<dyn ChunkSink>, SinkError> {
        let open_error = |e: std::io::Error| SinkError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(open_error)?;
        }
        let file = File::create(path).await.map_err(open_error)?;

        Ok(Box::new(FileSink {
            writer: BufWriter::new(file),
        }))
    }
}

/// Appends chunks to one file in delivery order
pub struct FileSink {
    writer: BufWriter<File>,
}

#[async_trait]
impl ChunkSink for FileSink {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> Result<(), SinkError> {
        self.writer
            .write_all(chunk.as_bytes())
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}
