//! Sample encodings
//!
//! Mixing works on `f64` buffers. Every supported encoding converts to and
//! from `f64` exactly for in-range values, so copying a channel through the
//! pipeline is byte-exact. Integer encodings clamp on the way back out.
//!
//! All encodings are little-endian as stored in RIFF/WAVE files. Unsigned
//! 8-bit samples are re-centred to `-128..=127` so that combining channels
//! operates on signed values.

use std::fmt;

/// Numeric type of one stored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 8-bit unsigned PCM (offset binary)
    U8,
    /// 16-bit signed PCM
    I16,
    /// 24-bit signed PCM, packed in 3 bytes
    I24,
    /// 32-bit signed PCM
    I32,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
}

impl SampleFormat {
    /// Map a WAVE format tag and bit depth to a sample format
    ///
    /// Returns `None` for compressed or otherwise unsupported encodings.
    pub fn from_wave(format_tag: u16, bits_per_sample: u16) -> Option<Self> {
        match (format_tag, bits_per_sample) {
            (WAVE_FORMAT_PCM, 8) => Some(SampleFormat::U8),
            (WAVE_FORMAT_PCM, 16) => Some(SampleFormat::I16),
            (WAVE_FORMAT_PCM, 24) => Some(SampleFormat::I24),
            (WAVE_FORMAT_PCM, 32) => Some(SampleFormat::I32),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Some(SampleFormat::F32),
            (WAVE_FORMAT_IEEE_FLOAT, 64) => Some(SampleFormat::F64),
            _ => None,
        }
    }

    /// Bytes per sample in the typed view
    pub fn itemsize(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }

    /// Decode `bytes` (a whole number of samples) into `out`
    pub fn decode_into(self, bytes: &[u8], out: &mut Vec<f64>) {
        debug_assert_eq!(bytes.len() % self.itemsize(), 0);
        out.reserve(bytes.len() / self.itemsize());

        let chunks = bytes.chunks_exact(self.itemsize());
        match self {
            SampleFormat::U8 => out.extend(chunks.map(|b| b[0] as f64 - 128.0)),
            SampleFormat::I16 => {
                out.extend(chunks.map(|b| i16::from_le_bytes([b[0], b[1]]) as f64))
            }
            SampleFormat::I24 => out.extend(chunks.map(|b| {
                // Place the 3 bytes in the top of an i32, then shift back to sign-extend
                (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f64
            })),
            SampleFormat::I32 => {
                out.extend(chunks.map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64))
            }
            SampleFormat::F32 => {
                out.extend(chunks.map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64))
            }
            SampleFormat::F64 => out.extend(chunks.map(|b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })),
        }
    }

    /// Encode `samples` into `out`, which must hold exactly
    /// `samples.len() * itemsize()` bytes
    pub fn encode_into(self, samples: &[f64], out: &mut [u8]) {
        debug_assert_eq!(out.len(), samples.len() * self.itemsize());

        let chunks = out.chunks_exact_mut(self.itemsize());
        match self {
            SampleFormat::U8 => {
                for (dst, &s) in chunks.zip(samples) {
                    dst[0] = (clamp_round(s, -128.0, 127.0) + 128.0) as u8;
                }
            }
            SampleFormat::I16 => {
                for (dst, &s) in chunks.zip(samples) {
                    let v = clamp_round(s, i16::MIN as f64, i16::MAX as f64) as i16;
                    dst.copy_from_slice(&v.to_le_bytes());
                }
            }
            SampleFormat::I24 => {
                for (dst, &s) in chunks.zip(samples) {
                    let v = clamp_round(s, I24_MIN, I24_MAX) as i32;
                    dst.copy_from_slice(&v.to_le_bytes()[..3]);
                }
            }
            SampleFormat::I32 => {
                for (dst, &s) in chunks.zip(samples) {
                    let v = clamp_round(s, i32::MIN as f64, i32::MAX as f64) as i32;
                    dst.copy_from_slice(&v.to_le_bytes());
                }
            }
            SampleFormat::F32 => {
                for (dst, &s) in chunks.zip(samples) {
                    dst.copy_from_slice(&(s as f32).to_le_bytes());
                }
            }
            SampleFormat::F64 => {
                for (dst, &s) in chunks.zip(samples) {
                    dst.copy_from_slice(&s.to_le_bytes());
                }
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::U8 => "u8",
            SampleFormat::I16 => "i16",
            SampleFormat::I24 => "i24",
            SampleFormat::I32 => "i32",
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
        };
        f.write_str(name)
    }
}

pub(crate) const WAVE_FORMAT_PCM: u16 = 0x0001;
pub(crate) const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub(crate) const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const I24_MIN: f64 = -8_388_608.0;
const I24_MAX: f64 = 8_388_607.0;

/// NaN maps to 0
fn clamp_round(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.round().clamp(min, max)
}
