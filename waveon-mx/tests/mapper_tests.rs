//! Channel Mapper integration tests
//!
//! Exercises the mapper against real files on disk:
//! - header copy and preservation
//! - output write/read round trips and byte-offset translation
//! - single-mapping exclusivity and the open/close state machine
//! - selector, mono, alignment and bounds errors

mod helpers;

use helpers::{read_i16_samples, write_i16_wav, write_stereo_i16_wav, write_wav_bytes, HEADER_SIZE};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use waveon_mx::audio::SampleFormat;
use waveon_mx::mapper::MapperState;
use waveon_mx::{ChannelMapper, ChannelSelector, MapMode, MixError, Segment};

struct Fixture {
    dir: TempDir,
    primary: PathBuf,
    auxiliaries: Vec<PathBuf>,
}

impl Fixture {
    /// Primary of `len` samples (value = index) plus one auxiliary per entry
    /// in `aux_lens` (value = -index)
    fn new(len: usize, aux_lens: &[usize]) -> Self {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("center.wav");
        let samples: Vec<i16> = (0..len as i16).collect();
        write_i16_wav(&primary, &samples);

        let auxiliaries = aux_lens
            .iter()
            .enumerate()
            .map(|(k, &aux_len)| {
                let path = dir.path().join(format!("aux{}.wav", k));
                let samples: Vec<i16> = (0..aux_len as i16).map(|v| -v).collect();
                write_i16_wav(&path, &samples);
                path
            })
            .collect();

        Self {
            dir,
            primary,
            auxiliaries,
        }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out.wav")
    }

    fn mapper(&self) -> ChannelMapper {
        ChannelMapper::new(&self.primary, self.auxiliaries.clone(), HEADER_SIZE).unwrap()
    }
}

#[test]
fn test_new_probes_primary() {
    let fixture = Fixture::new(100, &[]);
    let mapper = fixture.mapper();

    assert_eq!(mapper.length(), 100);
    assert_eq!(mapper.format(), SampleFormat::I16);
    assert_eq!(mapper.state(), MapperState::Closed);
    assert_eq!(mapper.live_mappings(), 0);
}

#[test]
fn test_missing_primary_is_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.wav");

    match ChannelMapper::new(&missing, vec![], HEADER_SIZE) {
        Err(MixError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("Expected Io error, got {:?}", other),
    }
}

/// **Given:** a primary file
/// **When:** the output is set up
/// **Then:** the output's first 44 bytes equal the primary's, and the file is
/// sized for every sample
#[test]
fn test_set_output_copies_header() {
    let fixture = Fixture::new(100, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    let primary_bytes = fs::read(&fixture.primary).unwrap();
    let output_bytes = fs::read(fixture.output()).unwrap();

    assert_eq!(output_bytes.len(), HEADER_SIZE + 100 * 2);
    assert_eq!(&output_bytes[..HEADER_SIZE], &primary_bytes[..HEADER_SIZE]);
    assert!(output_bytes[HEADER_SIZE..].iter().all(|&b| b == 0));
    assert_eq!(mapper.state(), MapperState::Closed);
    assert_eq!(mapper.output_path(), Some(fixture.output().as_path()));
}

#[test]
fn test_header_survives_segment_writes() {
    let fixture = Fixture::new(100, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    mapper.write(&vec![-1.0; 40], 0).unwrap();
    mapper.write(&vec![-2.0; 40], 40).unwrap();
    mapper.write(&vec![-3.0; 20], 80).unwrap();

    let primary_bytes = fs::read(&fixture.primary).unwrap();
    let output_bytes = fs::read(fixture.output()).unwrap();
    assert_eq!(&output_bytes[..HEADER_SIZE], &primary_bytes[..HEADER_SIZE]);
}

#[test]
fn test_byte_offset_translation() {
    let fixture = Fixture::new(10, &[]);
    let mapper = fixture.mapper();

    assert_eq!(mapper.byte_offset(0), Some(44));
    assert_eq!(mapper.byte_offset(1), Some(46));
    assert_eq!(mapper.byte_offset(7), Some(44 + 14));
    assert_eq!(mapper.byte_offset(usize::MAX), None);
}

/// **Given:** an output file
/// **When:** samples are written at offset 13
/// **Then:** reading [13, 13+len) back through a typed output mapping returns
/// the same samples, and the bytes sit at `13 * 2 + 44`
#[test]
fn test_write_then_read_round_trip() {
    let fixture = Fixture::new(64, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    let samples = vec![1.0, -1.0, 32767.0, -32768.0, 0.0, 1234.0];
    mapper.write(&samples, 13).unwrap();
    assert_eq!(
        mapper.state(),
        MapperState::MappedAs(ChannelSelector::Output, MapMode::Writable)
    );

    let read_back = mapper
        .open(ChannelSelector::Output)
        .unwrap()
        .read(Segment::new(13, samples.len()))
        .unwrap();
    assert_eq!(read_back, samples);

    let output_bytes = fs::read(fixture.output()).unwrap();
    let at = 13 * 2 + HEADER_SIZE;
    assert_eq!(&output_bytes[at..at + 4], &[1, 0, 0xFF, 0xFF]);

    // hound agrees on the whole file
    let decoded = read_i16_samples(fixture.output());
    assert_eq!(decoded.len(), 64);
    assert_eq!(&decoded[13..19], &[1, -1, 32767, -32768, 0, 1234]);
}

#[test]
fn test_write_reuses_covering_window() {
    let fixture = Fixture::new(32, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    mapper.write(&[5.0; 8], 8).unwrap();
    // Rewrite inside the same window
    mapper.write(&[6.0; 4], 10).unwrap();
    assert_eq!(mapper.live_mappings(), 1);

    let decoded = read_i16_samples(fixture.output());
    assert_eq!(&decoded[8..16], &[5, 5, 6, 6, 6, 6, 5, 5]);
}

#[test]
fn test_read_returns_copy_valid_after_close() {
    let fixture = Fixture::new(50, &[]);
    let mut mapper = fixture.mapper();

    let segment = mapper
        .open(ChannelSelector::Primary)
        .unwrap()
        .read(Segment::new(10, 5))
        .unwrap();
    mapper.close();

    assert_eq!(segment, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    assert_eq!(mapper.live_mappings(), 0);
}

/// **Given:** a mapper with auxiliary channels
/// **When:** channels are opened one after another
/// **Then:** exactly one mapping is alive after every open, and close drops it
#[test]
fn test_single_mapping_exclusivity() {
    let fixture = Fixture::new(20, &[20, 20]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    let selectors = [
        ChannelSelector::Primary,
        ChannelSelector::Auxiliary(0),
        ChannelSelector::Auxiliary(1),
        ChannelSelector::Output,
        ChannelSelector::Primary,
    ];
    for selector in selectors {
        let mapping = mapper.open(selector).unwrap();
        assert_eq!(mapping.selector(), selector);
        assert_eq!(mapping.mode(), MapMode::TypedSamples);
        assert_eq!(mapper.live_mappings(), 1, "after opening {}", selector);
        assert_eq!(
            mapper.state(),
            MapperState::MappedAs(selector, MapMode::TypedSamples)
        );
    }

    mapper.open_raw(ChannelSelector::Auxiliary(0)).unwrap();
    assert_eq!(mapper.live_mappings(), 1);
    mapper.write(&[0.0; 4], 0).unwrap();
    assert_eq!(mapper.live_mappings(), 1);

    mapper.close();
    assert_eq!(mapper.live_mappings(), 0);
    assert_eq!(mapper.state(), MapperState::Closed);
}

#[test]
fn test_close_is_idempotent() {
    let fixture = Fixture::new(10, &[]);
    let mut mapper = fixture.mapper();

    mapper.close();
    mapper.open(ChannelSelector::Primary).unwrap();
    mapper.close();
    mapper.close();
    assert_eq!(mapper.state(), MapperState::Closed);
}

#[test]
fn test_auxiliary_reads_use_own_data_offset() {
    let fixture = Fixture::new(4, &[]);
    let aux = fixture.dir.path().join("tagged.wav");
    let data: Vec<u8> = [7i16, 8, 9, 10]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    // 5-byte LIST chunk + pad byte moves "data" past byte 44
    write_wav_bytes(&aux, 1, 16, Some(b"INFOx"), &data);

    let mut mapper = ChannelMapper::new(&fixture.primary, vec![aux], HEADER_SIZE).unwrap();
    let mapping = mapper.open(ChannelSelector::Auxiliary(0)).unwrap();
    assert_eq!(mapping.info().unwrap().data_offset, 58);
    assert_eq!(
        mapping.read(Segment::new(0, 4)).unwrap(),
        vec![7.0, 8.0, 9.0, 10.0]
    );
}

#[test]
fn test_raw_view_reads_header_bytes() {
    let fixture = Fixture::new(10, &[]);
    let mut mapper = fixture.mapper();

    let header = mapper
        .open_raw(ChannelSelector::Primary)
        .unwrap()
        .read_raw(0..HEADER_SIZE)
        .unwrap();
    assert_eq!(&header[0..4], b"RIFF");
    assert_eq!(&header[8..12], b"WAVE");
    assert_eq!(&header[36..40], b"data");

    // Typed reads are refused on a raw view
    assert!(matches!(
        mapper.read(Segment::new(0, 1)),
        Err(MixError::NotMapped { .. })
    ));
}

#[test]
fn test_read_past_end_is_out_of_range() {
    let fixture = Fixture::new(100, &[]);
    let mut mapper = fixture.mapper();
    mapper.open(ChannelSelector::Primary).unwrap();

    match mapper.read(Segment::new(90, 20)) {
        Err(MixError::OutOfRange {
            start,
            end,
            available,
        }) => {
            assert_eq!((start, end, available), (90, 110, 100));
        }
        other => panic!("Expected OutOfRange, got {:?}", other),
    }
    // Exactly up to the end is fine
    assert_eq!(mapper.read(Segment::new(90, 10)).unwrap().len(), 10);
}

#[test]
fn test_write_past_end_is_out_of_range() {
    let fixture = Fixture::new(100, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();

    assert!(matches!(
        mapper.write(&[0.0; 11], 90),
        Err(MixError::OutOfRange { end: 101, .. })
    ));
    assert!(matches!(
        mapper.write(&[0.0; 1], 100),
        Err(MixError::OutOfRange { .. })
    ));
    mapper.write(&[0.0; 10], 90).unwrap();
}

/// **Given:** a segment whose start lies far past the end of the file
/// **When:** it is read from a typed mapping
/// **Then:** the read fails with OutOfRange instead of wrapping around
#[test]
fn test_read_at_huge_offset_is_out_of_range() {
    let fixture = Fixture::new(4, &[]);
    let mut mapper = fixture.mapper();

    match mapper.open(ChannelSelector::Primary).unwrap().read(Segment::new(usize::MAX, 2)) {
        Err(MixError::OutOfRange {
            start,
            end,
            available,
        }) => {
            assert_eq!(start, usize::MAX);
            assert_eq!(end, usize::MAX);
            assert_eq!(available, 4);
        }
        other => panic!("Expected OutOfRange, got {:?}", other),
    }
    assert!(matches!(
        mapper.read(Segment::new(2, usize::MAX)),
        Err(MixError::OutOfRange { .. })
    ));
}

/// **Given:** an output file
/// **When:** samples are written at an offset near `usize::MAX`
/// **Then:** the write fails with OutOfRange and the header is untouched
#[test]
fn test_write_at_huge_offset_keeps_header() {
    let fixture = Fixture::new(16, &[]);
    let mut mapper = fixture.mapper();
    mapper.set_output(fixture.output()).unwrap();
    let before = fs::read(fixture.output()).unwrap();

    for offset in [usize::MAX, usize::MAX / 2, usize::MAX - 15] {
        assert!(
            matches!(
                mapper.write(&[12345.0], offset),
                Err(MixError::OutOfRange { .. })
            ),
            "offset {}",
            offset
        );
    }

    assert_eq!(fs::read(fixture.output()).unwrap(), before);
}

/// **Given:** an output path naming one of the input files
/// **When:** the output is set up
/// **Then:** it is rejected and the input keeps its samples
#[test]
fn test_output_may_not_overwrite_an_input() {
    let fixture = Fixture::new(8, &[8]);
    let mut mapper = fixture.mapper();
    let primary_before = fs::read(&fixture.primary).unwrap();
    let aux_before = fs::read(&fixture.auxiliaries[0]).unwrap();

    assert!(matches!(
        mapper.set_output(&fixture.primary),
        Err(MixError::Config(_))
    ));
    // Same file reached through a different spelling
    let indirect = fixture.dir.path().join(".").join("aux0.wav");
    assert!(matches!(
        mapper.set_output(indirect),
        Err(MixError::Config(_))
    ));

    assert_eq!(fs::read(&fixture.primary).unwrap(), primary_before);
    assert_eq!(fs::read(&fixture.auxiliaries[0]).unwrap(), aux_before);
    assert_eq!(mapper.output_path(), None);
}

#[test]
fn test_write_before_set_output() {
    let fixture = Fixture::new(10, &[]);
    let mut mapper = fixture.mapper();

    assert!(matches!(mapper.write(&[0.0], 0), Err(MixError::OutputNotSet)));
    assert!(matches!(
        mapper.open(ChannelSelector::Output),
        Err(MixError::OutputNotSet)
    ));
}

#[test]
fn test_unknown_auxiliary_index() {
    let fixture = Fixture::new(10, &[10]);
    let mut mapper = fixture.mapper();

    match mapper.open(ChannelSelector::Auxiliary(1)) {
        Err(MixError::ChannelNotFound { index, count }) => assert_eq!((index, count), (1, 1)),
        other => panic!("Expected ChannelNotFound, got {:?}", other),
    }
    assert_eq!(mapper.state(), MapperState::Closed);
}

#[test]
fn test_stereo_auxiliary_is_not_mono() {
    let fixture = Fixture::new(10, &[]);
    let stereo = fixture.dir.path().join("stereo.wav");
    write_stereo_i16_wav(&stereo, 10);

    let mut mapper = ChannelMapper::new(&fixture.primary, vec![stereo], HEADER_SIZE).unwrap();
    assert!(matches!(
        mapper.open(ChannelSelector::Auxiliary(0)),
        Err(MixError::NotMono { channels: 2, .. })
    ));
    assert_eq!(mapper.live_mappings(), 0);
}

#[test]
fn test_stereo_primary_rejected_at_construction() {
    let dir = TempDir::new().unwrap();
    let stereo = dir.path().join("stereo.wav");
    write_stereo_i16_wav(&stereo, 10);

    assert!(matches!(
        ChannelMapper::new(&stereo, vec![], HEADER_SIZE),
        Err(MixError::NotMono { .. })
    ));
}

/// **Given:** a 24-bit primary with a 44-byte header
/// **When:** the output is set up
/// **Then:** setup fails with a format error, since 44 is not a multiple of 3
#[test]
fn test_header_alignment_precondition() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("24bit.wav");
    write_wav_bytes(&primary, 1, 24, None, &[0u8; 30]);

    let mut mapper = ChannelMapper::new(&primary, vec![], HEADER_SIZE).unwrap();
    assert_eq!(mapper.format(), SampleFormat::I24);
    assert_eq!(mapper.length(), 10);

    let output = dir.path().join("out.wav");
    assert!(matches!(
        mapper.set_output(&output),
        Err(MixError::Format { .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_header_size_must_match_primary_layout() {
    let fixture = Fixture::new(10, &[]);
    let mut mapper = ChannelMapper::new(&fixture.primary, vec![], 48).unwrap();

    assert!(matches!(
        mapper.set_output(fixture.output()),
        Err(MixError::Format { .. })
    ));
}

#[test]
fn test_float_primary_round_trip() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("float.wav");
    let data: Vec<u8> = [0.5f32, -0.25, 1.0, 0.0]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    write_wav_bytes(&primary, 3, 32, None, &data);

    let mut mapper = ChannelMapper::new(&primary, vec![], HEADER_SIZE).unwrap();
    assert_eq!(mapper.format(), SampleFormat::F32);

    let output = dir.path().join("out.wav");
    mapper.set_output(&output).unwrap();
    mapper.write(&[0.125, -0.75], 2).unwrap();

    let read_back = mapper
        .open(ChannelSelector::Output)
        .unwrap()
        .read(Segment::new(0, 4))
        .unwrap();
    assert_eq!(read_back, vec![0.0, 0.0, 0.125, -0.75]);
}
