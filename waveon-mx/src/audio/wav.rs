//! RIFF/WAVE header probing
//!
//! Parses the chunk layout of a mapped file to locate the `fmt ` and `data`
//! chunks. The typed sample view starts at `data_offset`, wherever the data
//! chunk happens to live; extra chunks before it (`LIST`, `fact`, ...) are
//! skipped.

use super::sample::{SampleFormat, WAVE_FORMAT_EXTENSIBLE};
use crate::error::{MixError, Result};
use std::path::Path;
use tracing::warn;

/// Audio layout information from the RIFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub format: SampleFormat,
    /// Number of interleaved channels
    pub channels: u16,
    pub sample_rate: u32,
    /// Byte offset of the first sample
    pub data_offset: usize,
    /// Length of the sample data in bytes
    pub data_len: usize,
}

impl WavInfo {
    /// Samples per channel
    pub fn sample_count(&self) -> usize {
        let frame = self.format.itemsize() * self.channels.max(1) as usize;
        self.data_len / frame
    }
}

/// Probe a RIFF/WAVE header from the start of `bytes`
///
/// `path` is only used for error context.
pub fn probe(bytes: &[u8], path: &Path) -> Result<WavInfo> {
    if bytes.len() < 12 {
        return Err(MixError::format(path, "File too short for a RIFF header"));
    }
    if &bytes[0..4] != b"RIFF" {
        return Err(MixError::format(path, "Not a RIFF file"));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(MixError::format(path, "Not a WAVE file"));
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = read_u32(bytes, pos + 4) as usize;
        let body = pos + 8;

        match chunk_id {
            b"fmt " => {
                let end = body + chunk_size;
                if end > bytes.len() {
                    return Err(MixError::format(path, "fmt chunk truncated"));
                }
                fmt = Some(FmtChunk::parse(&bytes[body..end], path)?);
            }
            b"data" => {
                let fmt = fmt.ok_or_else(|| MixError::format(path, "data chunk before fmt chunk"))?;
                let available = bytes.len() - body;
                let data_len = if chunk_size > available {
                    // Streaming writers leave a placeholder size; trust the file length
                    warn!(
                        "{}: data chunk declares {} bytes but only {} are present",
                        path.display(),
                        chunk_size,
                        available
                    );
                    available
                } else {
                    chunk_size
                };
                return Ok(WavInfo {
                    format: fmt.format,
                    channels: fmt.channels,
                    sample_rate: fmt.sample_rate,
                    data_offset: body,
                    data_len,
                });
            }
            _ => {}
        }

        // Chunks are padded to an even length
        pos = body + chunk_size + (chunk_size % 2);
    }

    if fmt.is_none() {
        Err(MixError::format(path, "Missing fmt chunk"))
    } else {
        Err(MixError::format(path, "Missing data chunk"))
    }
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
}

impl FmtChunk {
    fn parse(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < 16 {
            return Err(MixError::format(path, "fmt chunk too small"));
        }

        let mut format_tag = read_u16(data, 0);
        let channels = read_u16(data, 2);
        let sample_rate = read_u32(data, 4);
        let bits_per_sample = read_u16(data, 14);

        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            // The sub-format GUID starts with the real format tag
            if data.len() < 26 {
                return Err(MixError::format(path, "WAVE_FORMAT_EXTENSIBLE fmt chunk too small"));
            }
            format_tag = read_u16(data, 24);
        }

        let format = SampleFormat::from_wave(format_tag, bits_per_sample).ok_or_else(|| {
            MixError::format(
                path,
                format!(
                    "Unsupported encoding: format tag {:#06x}, {} bits per sample",
                    format_tag, bits_per_sample
                ),
            )
        })?;

        Ok(Self {
            format,
            channels,
            sample_rate,
        })
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
