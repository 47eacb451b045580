//! Uncompressed WAV container handling
//!
//! - `wav`: RIFF/WAVE header probing over raw bytes
//! - `sample`: sample encodings and the `f64` working representation

pub mod sample;
pub mod wav;

pub use sample::SampleFormat;
pub use wav::WavInfo;
