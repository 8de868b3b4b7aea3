//! flac-recorder - stream the microphone into a FLAC file
//!
//! This crate captures PCM from an input device, encodes it to FLAC on a
//! background transfer loop and appends the encoded chunks to an output file,
//! with pause, resume and a one-second progress clock.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Audio formats, the session state machine, config and errors
//! - **Application**: The recording session, transfer loop, progress clock and port traits
//! - **Infrastructure**: Adapter implementations (cpal, flacenc, files, notifications)
//! - **CLI**: Command-line interface, argument parsing, stdin control and signal handling

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
