//! WAV fixture generation
//!
//! 16-bit mono and stereo files are written with hound, which emits the
//! canonical 44-byte header for them. Other layouts (24-bit, float, extra
//! chunks before `data`) are assembled by hand.

#![allow(dead_code)]

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Header length of every file written by these helpers unless an extra
/// chunk is requested
pub const HEADER_SIZE: usize = 44;

const TEST_SAMPLE_RATE: u32 = 44100;

/// Write a mono 16-bit PCM file
pub fn write_i16_wav<P: AsRef<Path>>(path: P, samples: &[i16]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write a stereo 16-bit PCM file with `frames` silent frames
pub fn write_stereo_i16_wav<P: AsRef<Path>>(path: P, frames: usize) {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for _ in 0..frames * 2 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Read every sample of a 16-bit file back with hound
pub fn read_i16_samples<P: AsRef<Path>>(path: P) -> Vec<i16> {
    WavReader::open(path)
        .unwrap()
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Build a mono WAV file image by hand
///
/// * `format_tag` - 1 for PCM, 3 for IEEE float
/// * `bits` - bits per sample
/// * `extra_chunk` - optional chunk inserted between `fmt ` and `data`
/// * `data` - raw little-endian sample bytes
pub fn wav_bytes(format_tag: u16, bits: u16, extra_chunk: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
    let block_align = bits / 8;
    let extra_len = extra_chunk.map(|c| 8 + c.len() + c.len() % 2).unwrap_or(0);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&((36 + extra_len + data.len()) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&format_tag.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&TEST_SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(TEST_SAMPLE_RATE * block_align as u32).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());

    if let Some(chunk) = extra_chunk {
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        bytes.extend_from_slice(chunk);
        if chunk.len() % 2 == 1 {
            bytes.push(0);
        }
    }

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// Write a hand-built mono WAV file
pub fn write_wav_bytes<P: AsRef<Path>>(
    path: P,
    format_tag: u16,
    bits: u16,
    extra_chunk: Option<&[u8]>,
    data: &[u8],
) {
    std::fs::write(path, wav_bytes(format_tag, bits, extra_chunk, data)).unwrap();
}
