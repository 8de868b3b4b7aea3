//! Stream encoder adapters

mod flac_encoder;

pub use flac_encoder::{FlacEncoderFactory, FlacStreamEncoder, MAX_CHUNK_BYTES};
