//! Channel Mapper
//!
//! Owns at most one memory mapping at a time over one of the mixer's files
//! (primary, an auxiliary channel, or the output) and moves sample segments
//! in and out of it.
//!
//! # Mapping modes
//!
//! - **TypedSamples**: input (or output) file mapped read-only; the RIFF
//!   header is parsed and segment reads are relative to the data chunk.
//! - **RawBytes**: file mapped read-only as plain bytes; used to extract the
//!   primary's header.
//! - **Writable**: a window of the output file mapped read-write, starting
//!   at `sample_offset * itemsize + header_size`.
//!
//! # Exclusivity
//!
//! The active mapping lives in `Option<ActiveMapping>`. Every open first
//! takes and drops the previous mapping, so two mappings are never alive at
//! once. References returned by [`ChannelMapper::open`] borrow the mapper,
//! which keeps stale views from outliving the next open.
//!
//! # State machine
//!
//! ```text
//! Closed --open(sel)--> MappedAs(sel, mode) --close()--> Closed
//! MappedAs(..) --open(sel')--> (Closed) --> MappedAs(sel', mode')
//! any --write(..)--> MappedAs(Output, Writable)
//! ```

use crate::audio::{wav, SampleFormat, WavInfo};
use crate::error::{MixError, Result};
use crate::segment::Segment;
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Which file a mapping refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelSelector {
    /// Center channel; defines sample count and format
    Primary,
    /// Auxiliary channel by position in the configured list
    Auxiliary(usize),
    /// Mix destination
    Output,
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSelector::Primary => write!(f, "primary"),
            ChannelSelector::Auxiliary(index) => write!(f, "auxiliary #{}", index),
            ChannelSelector::Output => write!(f, "output"),
        }
    }
}

/// How the active mapping views its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    RawBytes,
    TypedSamples,
    Writable,
}

/// Observable mapper state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperState {
    Closed,
    MappedAs(ChannelSelector, MapMode),
}

/// Sample layout of the primary channel, shared by the output file
#[derive(Debug, Clone, Copy)]
struct PrimaryLayout {
    format: SampleFormat,
    sample_count: usize,
    data_offset: usize,
}

#[derive(Debug)]
enum MappedView {
    Raw(Mmap),
    Typed { map: Mmap, info: WavInfo },
    Writable { map: MmapMut, byte_offset: usize },
}

/// Counts live mappings for the owning mapper
#[derive(Debug)]
struct MappingLease(Arc<AtomicUsize>);

impl MappingLease {
    fn acquire(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for MappingLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The single live view over one file
///
/// Dropping it unmaps the file.
#[derive(Debug)]
pub struct ActiveMapping {
    selector: ChannelSelector,
    path: PathBuf,
    view: MappedView,
    // Declared after `view`: the count drops only once the mapping is gone
    _lease: MappingLease,
}

impl ActiveMapping {
    fn typed(selector: ChannelSelector, path: &Path, live: &Arc<AtomicUsize>) -> Result<Self> {
        let map = map_read_only(path)?;
        let info = wav::probe(&map, path)?;
        if info.channels != 1 {
            return Err(MixError::NotMono {
                path: path.to_path_buf(),
                channels: info.channels,
            });
        }
        Ok(Self {
            selector,
            path: path.to_path_buf(),
            view: MappedView::Typed { map, info },
            _lease: MappingLease::acquire(live),
        })
    }

    fn raw(selector: ChannelSelector, path: &Path, live: &Arc<AtomicUsize>) -> Result<Self> {
        let map = map_read_only(path)?;
        Ok(Self {
            selector,
            path: path.to_path_buf(),
            view: MappedView::Raw(map),
            _lease: MappingLease::acquire(live),
        })
    }

    fn writable(
        path: &Path,
        byte_offset: usize,
        byte_len: usize,
        live: &Arc<AtomicUsize>,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| MixError::io(path, e))?;

        // SAFETY: the output file is created and owned by this mapper; nothing
        // else truncates it while the window is mapped.
        let map = unsafe {
            MmapOptions::new()
                .offset(byte_offset as u64)
                .len(byte_len)
                .map_mut(&file)
        }
        .map_err(|e| MixError::io(path, e))?;

        Ok(Self {
            selector: ChannelSelector::Output,
            path: path.to_path_buf(),
            view: MappedView::Writable { map, byte_offset },
            _lease: MappingLease::acquire(live),
        })
    }

    pub fn selector(&self) -> ChannelSelector {
        self.selector
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> MapMode {
        match self.view {
            MappedView::Raw(_) => MapMode::RawBytes,
            MappedView::Typed { .. } => MapMode::TypedSamples,
            MappedView::Writable { .. } => MapMode::Writable,
        }
    }

    /// Header information, for typed mappings only
    pub fn info(&self) -> Option<WavInfo> {
        match &self.view {
            MappedView::Typed { info, .. } => Some(*info),
            _ => None,
        }
    }

    /// Copy a sample range out of a typed mapping
    ///
    /// The returned buffer owns its data and stays valid after the mapping
    /// is released.
    pub fn read(&self, segment: Segment) -> Result<Vec<f64>> {
        let MappedView::Typed { map, info } = &self.view else {
            return Err(MixError::NotMapped {
                expected: "typed sample",
            });
        };

        let available = info.sample_count();
        if !segment.fits_within(available) {
            return Err(MixError::OutOfRange {
                start: segment.start,
                end: segment.end(),
                available,
            });
        }

        // Relative to the data chunk; the container header is already skipped
        let itemsize = info.format.itemsize();
        let start = info.data_offset + segment.start * itemsize;
        let end = start + segment.len * itemsize;

        let mut samples = Vec::with_capacity(segment.len);
        info.format.decode_into(&map[start..end], &mut samples);
        Ok(samples)
    }

    /// Copy a byte range out of a raw mapping
    pub fn read_raw(&self, range: Range<usize>) -> Result<Vec<u8>> {
        let MappedView::Raw(map) = &self.view else {
            return Err(MixError::NotMapped { expected: "raw byte" });
        };
        if range.start > range.end || range.end > map.len() {
            return Err(MixError::OutOfRange {
                start: range.start,
                end: range.end,
                available: map.len(),
            });
        }
        Ok(map[range].to_vec())
    }

    /// True if this is a writable output window containing the byte range
    fn covers(&self, byte_offset: usize, byte_len: usize) -> bool {
        match &self.view {
            MappedView::Writable {
                map,
                byte_offset: start,
            } => byte_offset >= *start && byte_offset + byte_len <= *start + map.len(),
            _ => false,
        }
    }

    /// Mutable bytes of the output file at absolute `byte_offset`
    fn output_bytes_mut(&mut self, byte_offset: usize, byte_len: usize) -> Result<&mut [u8]> {
        match &mut self.view {
            MappedView::Writable {
                map,
                byte_offset: start,
            } => {
                let from = byte_offset - *start;
                Ok(&mut map[from..from + byte_len])
            }
            _ => Err(MixError::NotMapped {
                expected: "writable output",
            }),
        }
    }

    /// Flush an absolute byte range of the output window to disk
    fn flush(&self, byte_offset: usize, byte_len: usize) -> Result<()> {
        match &self.view {
            MappedView::Writable {
                map,
                byte_offset: start,
            } => map
                .flush_range(byte_offset - *start, byte_len)
                .map_err(|e| MixError::io(&self.path, e)),
            _ => Err(MixError::NotMapped {
                expected: "writable output",
            }),
        }
    }
}

/// Exclusive-mapping access to the mixer's files
#[derive(Debug)]
pub struct ChannelMapper {
    primary: PathBuf,
    auxiliaries: Vec<PathBuf>,
    header_size: usize,
    layout: PrimaryLayout,
    output: Option<PathBuf>,
    active: Option<ActiveMapping>,
    live: Arc<AtomicUsize>,
}

impl ChannelMapper {
    /// Create a mapper over a primary file and its auxiliary channels
    ///
    /// The primary is probed immediately; a missing, malformed or
    /// multi-channel primary fails here.
    ///
    /// # Arguments
    ///
    /// * `primary` - Center channel path
    /// * `auxiliaries` - Auxiliary channel paths, in mixing order
    /// * `header_size` - Fixed container header length in bytes (44 for a
    ///   canonical WAV)
    pub fn new(
        primary: impl Into<PathBuf>,
        auxiliaries: Vec<PathBuf>,
        header_size: usize,
    ) -> Result<Self> {
        let primary = primary.into();
        let live = Arc::new(AtomicUsize::new(0));

        let layout = {
            let probe = ActiveMapping::typed(ChannelSelector::Primary, &primary, &live)?;
            let info = probe.info().ok_or(MixError::NotMapped {
                expected: "typed sample",
            })?;
            PrimaryLayout {
                format: info.format,
                sample_count: info.sample_count(),
                data_offset: info.data_offset,
            }
        };

        debug!(
            "Primary {}: {} samples of {}, data at byte {}",
            primary.display(),
            layout.sample_count,
            layout.format,
            layout.data_offset
        );

        Ok(Self {
            primary,
            auxiliaries,
            header_size,
            layout,
            output: None,
            active: None,
            live,
        })
    }

    /// Number of samples in the primary channel (and the output)
    pub fn length(&self) -> usize {
        self.layout.sample_count
    }

    pub fn format(&self) -> SampleFormat {
        self.layout.format
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn auxiliary_count(&self) -> usize {
        self.auxiliaries.len()
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn state(&self) -> MapperState {
        match &self.active {
            Some(mapping) => MapperState::MappedAs(mapping.selector(), mapping.mode()),
            None => MapperState::Closed,
        }
    }

    /// Number of mappings currently alive for this mapper (0 or 1)
    pub fn live_mappings(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Output file byte position of sample index `offset`
    ///
    /// Only meaningful for the output file, whose samples start right after
    /// the fixed header. `None` if the position does not fit in `usize`.
    pub fn byte_offset(&self, offset: usize) -> Option<usize> {
        offset
            .checked_mul(self.layout.format.itemsize())?
            .checked_add(self.header_size)
    }

    /// Create the output file and copy the primary's header into it
    ///
    /// The output gets `header_size + length() * itemsize` bytes; the body
    /// is zero-filled until segments are written.
    ///
    /// # Errors
    ///
    /// * `Format` - `header_size` is not a multiple of the sample size, or
    ///   the primary's samples do not start at `header_size`
    /// * `Io` - the primary cannot be mapped or the output cannot be created
    /// * `Config` - the output path names the primary or an auxiliary file
    pub fn set_output(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let header_size = self.header_size;
        let itemsize = self.layout.format.itemsize();

        if let Some(input) = self.input_at(&path) {
            return Err(MixError::Config(format!(
                "output {} would overwrite input channel {}",
                path.display(),
                input.display()
            )));
        }

        if header_size % itemsize != 0 {
            return Err(MixError::format(
                &self.primary,
                format!(
                    "header size {} is not a multiple of the {}-byte {} sample size",
                    header_size, itemsize, self.layout.format
                ),
            ));
        }
        if self.layout.data_offset != header_size {
            return Err(MixError::format(
                &self.primary,
                format!(
                    "sample data starts at byte {} but the header size is {}",
                    self.layout.data_offset, header_size
                ),
            ));
        }

        let header = self
            .open_raw(ChannelSelector::Primary)?
            .read_raw(0..header_size)?;
        self.close();

        let total_len = header_size + self.layout.sample_count * itemsize;
        create_output_file(&path, total_len)?;
        self.output = Some(path.clone());

        if !header.is_empty() {
            let mapping = self.writable_window(0, header.len())?;
            mapping
                .output_bytes_mut(0, header.len())?
                .copy_from_slice(&header);
            mapping.flush(0, header.len())?;
        }
        self.close();

        info!(
            "Created output {} ({} bytes, {}-byte header)",
            path.display(),
            total_len,
            header_size
        );
        Ok(())
    }

    /// Map a channel as typed samples, releasing any previous mapping
    ///
    /// # Errors
    ///
    /// * `ChannelNotFound` - auxiliary index out of range
    /// * `OutputNotSet` - `Output` selected before [`Self::set_output`]
    /// * `NotMono` - the file has more than one interleaved channel
    /// * `Format` / `Io` - the file cannot be mapped or parsed
    pub fn open(&mut self, selector: ChannelSelector) -> Result<&ActiveMapping> {
        self.close();
        let path = self.path_for(selector)?.to_path_buf();
        let mapping = ActiveMapping::typed(selector, &path, &self.live)?;
        trace!("Mapped {} ({}) as typed samples", selector, path.display());
        Ok(&*self.active.insert(mapping))
    }

    /// Map a channel as raw bytes, releasing any previous mapping
    pub fn open_raw(&mut self, selector: ChannelSelector) -> Result<&ActiveMapping> {
        self.close();
        let path = self.path_for(selector)?.to_path_buf();
        let mapping = ActiveMapping::raw(selector, &path, &self.live)?;
        trace!("Mapped {} ({}) as raw bytes", selector, path.display());
        Ok(&*self.active.insert(mapping))
    }

    /// Release the active mapping, if any
    pub fn close(&mut self) {
        if let Some(mapping) = self.active.take() {
            trace!("Released {} mapping of {}", mapping.selector(), mapping.path().display());
        }
    }

    /// Copy a segment out of the active typed mapping
    pub fn read(&self, segment: Segment) -> Result<Vec<f64>> {
        self.active
            .as_ref()
            .ok_or(MixError::NotMapped {
                expected: "typed sample",
            })?
            .read(segment)
    }

    /// Copy a byte range out of the active raw mapping
    pub fn read_raw(&self, range: Range<usize>) -> Result<Vec<u8>> {
        self.active
            .as_ref()
            .ok_or(MixError::NotMapped { expected: "raw byte" })?
            .read_raw(range)
    }

    /// Write samples into the output starting at sample index `offset`
    ///
    /// Maps (or reuses) a writable window at `byte_offset(offset)`, encodes
    /// `buffer` in the primary's sample format and flushes before returning.
    /// Leaves the mapper in `MappedAs(Output, Writable)`.
    pub fn write(&mut self, buffer: &[f64], offset: usize) -> Result<()> {
        if self.output.is_none() {
            return Err(MixError::OutputNotSet);
        }

        let available = self.layout.sample_count;
        let out_of_range = || MixError::OutOfRange {
            start: offset,
            end: offset.saturating_add(buffer.len()),
            available,
        };
        if !Segment::new(offset, buffer.len()).fits_within(available) {
            return Err(out_of_range());
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let format = self.layout.format;
        let byte_offset = self.byte_offset(offset).ok_or_else(out_of_range)?;
        let byte_len = buffer.len() * format.itemsize();

        let mapping = self.writable_window(byte_offset, byte_len)?;
        format.encode_into(buffer, mapping.output_bytes_mut(byte_offset, byte_len)?);
        mapping.flush(byte_offset, byte_len)?;

        trace!("Wrote {} samples at offset {} (byte {})", buffer.len(), offset, byte_offset);
        Ok(())
    }

    /// Check every auxiliary channel against the primary
    ///
    /// Each channel is opened in turn, so mono/format problems surface here
    /// rather than in the middle of a mixing pass.
    ///
    /// # Errors
    ///
    /// * `NotMono` - an auxiliary has more than one channel
    /// * `Format` - an auxiliary's sample format differs from the primary's
    /// * `LengthMismatch` - an auxiliary's sample count differs
    pub fn validate_channels(&mut self) -> Result<()> {
        for index in 0..self.auxiliaries.len() {
            let info = self
                .open(ChannelSelector::Auxiliary(index))?
                .info()
                .ok_or(MixError::NotMapped {
                    expected: "typed sample",
                })?;
            self.close();

            let path = &self.auxiliaries[index];
            if info.format != self.layout.format {
                return Err(MixError::format(
                    path,
                    format!(
                        "sample format {} differs from primary format {}",
                        info.format, self.layout.format
                    ),
                ));
            }
            if info.sample_count() != self.layout.sample_count {
                return Err(MixError::LengthMismatch {
                    path: path.clone(),
                    expected: self.layout.sample_count,
                    found: info.sample_count(),
                });
            }
        }

        debug!("Validated {} auxiliary channels", self.auxiliaries.len());
        Ok(())
    }

    /// Input file (primary or auxiliary) that `path` resolves to, if any
    fn input_at(&self, path: &Path) -> Option<&Path> {
        // A path that does not exist yet cannot be one of the inputs
        let target = fs::canonicalize(path).ok()?;
        std::iter::once(&self.primary)
            .chain(&self.auxiliaries)
            .find(|input| fs::canonicalize(input).is_ok_and(|c| c == target))
            .map(PathBuf::as_path)
    }

    fn path_for(&self, selector: ChannelSelector) -> Result<&Path> {
        match selector {
            ChannelSelector::Primary => Ok(&self.primary),
            ChannelSelector::Auxiliary(index) => self
                .auxiliaries
                .get(index)
                .map(PathBuf::as_path)
                .ok_or(MixError::ChannelNotFound {
                    index,
                    count: self.auxiliaries.len(),
                }),
            ChannelSelector::Output => self.output.as_deref().ok_or(MixError::OutputNotSet),
        }
    }

    /// Active writable window covering the byte range, mapping one if needed
    fn writable_window(&mut self, byte_offset: usize, byte_len: usize) -> Result<&mut ActiveMapping> {
        let reusable = self
            .active
            .as_ref()
            .is_some_and(|m| m.covers(byte_offset, byte_len));

        if !reusable {
            self.close();
            let path = self.output.clone().ok_or(MixError::OutputNotSet)?;
            let mapping = ActiveMapping::writable(&path, byte_offset, byte_len, &self.live)?;
            trace!("Mapped output window at byte {} (+{})", byte_offset, byte_len);
            self.active = Some(mapping);
        }

        self.active.as_mut().ok_or(MixError::NotMapped {
            expected: "writable output",
        })
    }
}

fn map_read_only(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| MixError::io(path, e))?;
    // SAFETY: input files are treated as immutable for the duration of a
    // mixing pass.
    unsafe { Mmap::map(&file) }.map_err(|e| MixError::io(path, e))
}

fn create_output_file(path: &Path, len: usize) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| MixError::io(path, e))?;
    file.set_len(len as u64).map_err(|e| MixError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_display() {
        assert_eq!(ChannelSelector::Primary.to_string(), "primary");
        assert_eq!(ChannelSelector::Auxiliary(3).to_string(), "auxiliary #3");
        assert_eq!(ChannelSelector::Output.to_string(), "output");
    }

    #[test]
    fn test_lease_counts_follow_drop() {
        let live = Arc::new(AtomicUsize::new(0));
        let first = MappingLease::acquire(&live);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        drop(first);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
