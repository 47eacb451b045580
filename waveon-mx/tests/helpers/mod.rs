//! Test helper modules for waveon-mx integration tests
//!
//! Provides reusable fixture generation:
//! - hound-written mono/stereo 16-bit files
//! - hand-built headers for layouts hound does not produce

pub mod wav_fixtures;

pub use wav_fixtures::{
    read_i16_samples, wav_bytes, write_i16_wav, write_stereo_i16_wav, write_wav_bytes,
    HEADER_SIZE,
};
