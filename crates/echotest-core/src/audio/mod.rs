//! Audio processing module
//!
//! This module contains all audio-related functionality including:
//! - Mono sample buffers ([`buffer`])
//! - Synchronized playback and loopback recording ([`engine`])
//! - Reference signal download and WAV decoding ([`signal`])
//! - Echo metric computation ([`analyzer`])

pub mod analyzer;
pub mod buffer;
pub mod engine;
pub mod signal;
