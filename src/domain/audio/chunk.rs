//! Encoder output unit

/// A run of encoded bytes handed from the encoder to the output sink.
///
/// The chunk is moved on delivery; nothing upstream keeps a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    bytes: Vec<u8>,
}

impl EncodedChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for EncodedChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
