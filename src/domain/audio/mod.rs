//! Audio value objects

mod chunk;
mod meta;
pub mod pcm;

pub use chunk::EncodedChunk;
pub use meta::{AudioMeta, SUPPORTED_BITS_PER_SAMPLE};
