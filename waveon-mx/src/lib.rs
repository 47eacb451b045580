//! # Waveon Mixer Library (waveon-mx)
//!
//! Segmented multi-channel mixing over memory-mapped WAV files.
//!
//! **Purpose:** Combine a primary (center) channel with any number of
//! auxiliary mono channels, segment by segment, writing the result into an
//! output file at matching byte offsets. No input file is ever read in full.
//!
//! **Architecture:**
//! - [`mapper::ChannelMapper`] owns at most one memory mapping at a time and
//!   translates sample indices to output byte offsets
//! - [`driver::MixingDriver`] walks the segments and combines channels
//!
//! ```no_run
//! use std::path::PathBuf;
//! use waveon_mx::driver::{mix_files, MixSettings};
//!
//! let report = mix_files(
//!     "center.wav",
//!     "out.wav",
//!     &[PathBuf::from("left.wav"), PathBuf::from("right.wav")],
//!     &MixSettings::default(),
//! )?;
//! println!("mixed {} samples in {} segments", report.samples, report.segments);
//! # Ok::<(), waveon_mx::MixError>(())
//! ```

pub mod audio;
pub mod driver;
pub mod error;
pub mod mapper;
pub mod segment;

pub use driver::{mix_files, MixReport, MixSettings, MixingDriver};
pub use error::{MixError, Result};
pub use mapper::{ChannelMapper, ChannelSelector, MapMode};
pub use segment::{Segment, SegmentPlan};
