//! Mixing Driver
//!
//! Walks the primary channel segment by segment. For each segment:
//!
//! 1. open the primary and copy the segment into the accumulator
//! 2. for each auxiliary channel, in order: open it, read the same segment
//!    and fold `gain * aux` into the accumulator (subtracted by default)
//! 3. write the accumulator to the output at the segment's start offset
//!
//! Each open releases the previous mapping, so the driver never holds more
//! than one. Any failure aborts the pass; segments already written stay in
//! the output, the remainder is left zero-filled.

use crate::error::{MixError, Result};
use crate::mapper::{ChannelMapper, ChannelSelector};
use crate::segment::{Segment, SegmentPlan};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use waveon_common::config::{DEFAULT_GAIN, DEFAULT_HEADER_SIZE, DEFAULT_SEGMENT_SIZE};
use waveon_common::{CombineMode, MixConfig};

/// Parameters of one mixing pass
#[derive(Debug, Clone, PartialEq)]
pub struct MixSettings {
    /// Samples per segment
    pub segment_size: usize,

    /// Fixed container header length in bytes
    pub header_size: usize,

    /// Per-auxiliary gains; channels past the end use `default_gain`
    pub gains: Vec<f64>,

    pub default_gain: f64,

    pub combine: CombineMode,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            gains: Vec::new(),
            default_gain: DEFAULT_GAIN,
            combine: CombineMode::default(),
        }
    }
}

impl MixSettings {
    /// Settings from a loaded configuration, with explicit per-channel gains
    pub fn from_config(config: &MixConfig, gains: Vec<f64>) -> Self {
        Self {
            segment_size: config.segment_size,
            header_size: config.header_size,
            gains,
            default_gain: config.default_gain,
            combine: config.combine,
        }
    }

    /// Gain for auxiliary channel `index`
    pub fn gain_for(&self, index: usize) -> f64 {
        self.gains.get(index).copied().unwrap_or(self.default_gain)
    }

    /// Check the settings against the number of auxiliary channels
    pub fn validate(&self, auxiliary_count: usize) -> Result<()> {
        if self.segment_size == 0 {
            return Err(MixError::Config("segment size must be at least 1".to_string()));
        }
        if self.gains.len() > auxiliary_count {
            return Err(MixError::Config(format!(
                "{} gains given for {} auxiliary channels",
                self.gains.len(),
                auxiliary_count
            )));
        }
        if let Some(bad) = self
            .gains
            .iter()
            .chain(std::iter::once(&self.default_gain))
            .find(|g| !g.is_finite())
        {
            return Err(MixError::Config(format!("gain must be finite, got {}", bad)));
        }
        Ok(())
    }
}

/// Summary of a completed mixing pass
#[derive(Debug, Clone, PartialEq)]
pub struct MixReport {
    pub segments: usize,
    pub samples: usize,
    pub auxiliary_channels: usize,
    pub elapsed: Duration,
}

/// Fold `gain * channel` into `acc` according to `combine`
pub fn accumulate(acc: &mut [f64], channel: &[f64], gain: f64, combine: CombineMode) {
    debug_assert_eq!(acc.len(), channel.len());
    let scale = combine.sign() * gain;
    for (a, &c) in acc.iter_mut().zip(channel) {
        *a += scale * c;
    }
}

/// Segment loop over a [`ChannelMapper`]
#[derive(Debug)]
pub struct MixingDriver {
    mapper: ChannelMapper,
    settings: MixSettings,
}

impl MixingDriver {
    /// Validate settings and auxiliary channels against the primary
    ///
    /// Every auxiliary channel is probed here, so a short, multi-channel or
    /// differently-encoded auxiliary fails before any segment is processed.
    pub fn new(mut mapper: ChannelMapper, settings: MixSettings) -> Result<Self> {
        settings.validate(mapper.auxiliary_count())?;
        mapper.validate_channels()?;
        Ok(Self { mapper, settings })
    }

    pub fn mapper(&self) -> &ChannelMapper {
        &self.mapper
    }

    pub fn into_mapper(self) -> ChannelMapper {
        self.mapper
    }

    /// Create the output file; see [`ChannelMapper::set_output`]
    pub fn set_output(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.mapper.set_output(path)
    }

    /// Segments this driver will process, in order
    pub fn plan(&self) -> Result<SegmentPlan> {
        SegmentPlan::new(self.mapper.length(), self.settings.segment_size)
    }

    /// Mix the whole file
    ///
    /// Requires the mapper's output to be set up. Stops at the first error.
    pub fn run(&mut self) -> Result<MixReport> {
        let started = Instant::now();
        let plan = self.plan()?;
        let segment_count = plan.segment_count();
        let auxiliary_channels = self.mapper.auxiliary_count();

        if self.mapper.length() == 0 {
            warn!("Primary {} has no samples", self.mapper.primary_path().display());
        }
        info!(
            "Mixing {} samples in {} segments of up to {} ({} auxiliary channels, {:?})",
            self.mapper.length(),
            segment_count,
            self.settings.segment_size,
            auxiliary_channels,
            self.settings.combine
        );

        for (index, segment) in plan.enumerate() {
            debug!(
                "Segment {}/{}: samples {}..{}",
                index + 1,
                segment_count,
                segment.start,
                segment.end()
            );
            self.mix_segment(segment)?;
        }
        self.mapper.close();

        let report = MixReport {
            segments: segment_count,
            samples: self.mapper.length(),
            auxiliary_channels,
            elapsed: started.elapsed(),
        };
        info!(
            "Mixed {} samples in {} segments ({:.3}s)",
            report.samples,
            report.segments,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Combine one segment across all channels and write it to the output
    pub fn mix_segment(&mut self, segment: Segment) -> Result<()> {
        let mut acc = self.mapper.open(ChannelSelector::Primary)?.read(segment)?;

        for index in 0..self.mapper.auxiliary_count() {
            let channel = self
                .mapper
                .open(ChannelSelector::Auxiliary(index))?
                .read(segment)?;
            accumulate(
                &mut acc,
                &channel,
                self.settings.gain_for(index),
                self.settings.combine,
            );
        }

        self.mapper.write(&acc, segment.start)
    }
}

/// Mix `primary` and `auxiliaries` into a new file at `output`
///
/// Channels are validated before the output file is created, so a
/// configuration error leaves no output behind.
///
/// # Errors
///
/// See [`crate::MixError`]; the first error aborts the pass.
pub fn mix_files(
    primary: impl AsRef<Path>,
    output: impl AsRef<Path>,
    auxiliaries: &[PathBuf],
    settings: &MixSettings,
) -> Result<MixReport> {
    let mapper = ChannelMapper::new(
        primary.as_ref(),
        auxiliaries.to_vec(),
        settings.header_size,
    )?;
    let mut driver = MixingDriver::new(mapper, settings.clone())?;
    driver.set_output(output.as_ref())?;
    driver.run()
}
