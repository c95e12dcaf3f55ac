//! Decoding integration tests.
//!
//! These tests go all the way from Ogg Opus bytes produced by libopus to
//! decoded PCM, and check:
//! - exact frame counts (pre-skip and end trimming),
//! - header metadata reported alongside the samples,
//! - chained links and multiplexed non-Opus streams,
//! - recovery from corrupt or missing pages,
//! - granule positions: non-zero starts, end trimming, invalid values,
//! - header gain handling.

use std::io::{Cursor, Write};

use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use rstest::rstest;

use jopus::{
    decode_bytes, decode_file, DecodeSettings, Error, OpusError, OpusFile, OpusTags,
};
use jopus_tests::{
    setup_tracing, EncodedLink, LinkSpec, OpusFixture, FRAME_SIZE, PACKETS_PER_PAGE, PRE_SKIP,
    VENDOR,
};

fn decode(data: Vec<u8>) -> jopus::Result<jopus::OpusAudio> {
    decode_bytes(data, "fixture", &DecodeSettings::default())
}

#[rstest]
#[case::mono_short(1, 0.5)]
#[case::mono(1, 1.0)]
#[case::stereo(2, 1.0)]
#[case::stereo_odd_length(2, 1.337)]
fn decodes_exact_frame_count(#[case] channels: u8, #[case] duration_secs: f32) {
    setup_tracing();
    let spec = LinkSpec::sine(42, channels, duration_secs);
    let expected = spec.frames;
    let audio = decode(OpusFixture::to_bytes(&OpusFixture::encode_link(spec))).unwrap();

    assert_eq!(audio.channel_count, channels);
    assert_eq!(audio.frames(), expected);
    assert_eq!(audio.samples.len(), expected * channels as usize);
    assert!((audio.duration - expected as f32 / 48_000.0).abs() < 1e-6);
    assert!(
        OpusFixture::verify_samples_not_silence(&audio.samples),
        "decoded audio is silent"
    );
}

#[test]
fn reports_header_metadata() {
    setup_tracing();
    let data = OpusFixture::sine_stream(2, 0.5);
    let size = data.len() as u64;
    let audio = decode(data).unwrap();

    assert_eq!(audio.size_in_bytes, size);
    assert_eq!(audio.input_sample_rate, 44_100);
    assert_eq!(audio.pre_skip, PRE_SKIP);
    assert_eq!(audio.stream_count, 1);
    assert_eq!(audio.mapping_family, 0);
    assert_eq!(audio.output_gain, 0);
    assert_eq!(audio.vendor, VENDOR);
    assert_eq!(audio.comments, vec!["TITLE=Fixture", "ARTIST=jopus"]);
    assert_eq!(audio.sample_rate(), 48_000);
}

#[test]
fn decodes_from_file() {
    setup_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&OpusFixture::sine_stream(1, 0.25)).unwrap();
    file.flush().unwrap();

    let audio = decode_file(file.path()).unwrap();
    assert_eq!(audio.frames(), 12_000);
}

#[test]
fn decodes_chained_links_in_order() {
    setup_tracing();
    let a = OpusFixture::encode_link(LinkSpec::sine(1, 2, 0.5));
    let b = OpusFixture::encode_link(LinkSpec::sine(2, 2, 0.75));
    let data = OpusFixture::chain(&[a, b]);

    let mut file = OpusFile::open_seekable(Cursor::new(data.clone())).unwrap();
    assert_eq!(file.link_count(), 2);
    assert_eq!(file.pcm_total(Some(0)).unwrap(), 24_000);
    assert_eq!(file.pcm_total(Some(1)).unwrap(), 36_000);

    let mut buf = vec![0.0f32; 5760 * 2];
    let mut per_link = [0usize; 2];
    loop {
        let n = file.read_float(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        per_link[file.current_link()] += n;
    }
    assert_eq!(per_link, [24_000, 36_000]);

    let audio = decode(data).unwrap();
    assert_eq!(audio.frames(), 60_000);
    assert!((audio.duration - 1.25).abs() < 1e-6);
}

#[test]
fn chained_link_with_other_channel_count_is_unsupported() {
    setup_tracing();
    let a = OpusFixture::encode_link(LinkSpec::sine(1, 1, 0.2));
    let b = OpusFixture::encode_link(LinkSpec::sine(2, 2, 0.2));
    let err = decode(OpusFixture::chain(&[a, b])).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode {
            source: OpusError::Impl,
            ..
        }
    ));
}

#[test]
fn skips_multiplexed_non_opus_stream() {
    setup_tracing();
    let link = OpusFixture::encode_link(LinkSpec::sine(7, 1, 0.3));

    // Both BOS pages first, then the other stream's data between ours.
    let mut w = PacketWriter::new(Vec::new());
    link.write_head(&mut w).unwrap();
    w.write_packet(b"\x80theora-ish".to_vec(), 99, PacketWriteEndInfo::EndPage, 0)
        .unwrap();
    link.write_tags(&mut w).unwrap();
    w.write_packet(b"frame".to_vec(), 99, PacketWriteEndInfo::EndPage, 0)
        .unwrap();
    link.write_audio(&mut w).unwrap();

    let audio = decode(w.into_inner()).unwrap();
    assert_eq!(audio.frames(), link.spec.frames);
}

fn corrupt_link() -> EncodedLink {
    OpusFixture::encode_link(LinkSpec::sine(3, 1, 2.0))
}

#[test]
fn corrupt_page_is_skipped_as_hole() {
    setup_tracing();
    let link = corrupt_link();
    let victim = EncodedLink::FIRST_AUDIO_PAGE + 3;
    let mut data = OpusFixture::to_bytes(&link);
    let at = OpusFixture::page_ranges(&data)[victim].end - 5;
    data[at] ^= 0x5a;

    let audio = decode(data).unwrap();
    let lost = PACKETS_PER_PAGE * FRAME_SIZE;
    assert_eq!(audio.frames(), link.spec.frames - lost);
}

#[test]
fn missing_page_is_reported_by_read_float() {
    setup_tracing();
    let link = corrupt_link();
    let data = OpusFixture::without_page(
        &OpusFixture::to_bytes(&link),
        EncodedLink::FIRST_AUDIO_PAGE + 1,
    );

    let mut file = OpusFile::open(Cursor::new(data)).unwrap();
    let mut buf = vec![0.0f32; 5760];
    let mut holes = 0;
    let mut frames = 0;
    loop {
        match file.read_float(&mut buf) {
            Ok(0) => break,
            Ok(n) => frames += n,
            Err(OpusError::Hole) => holes += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(holes, 1);
    assert_eq!(frames, link.spec.frames - PACKETS_PER_PAGE * FRAME_SIZE);
}

#[test]
fn missing_comment_header_fails_to_open() {
    setup_tracing();
    let link = OpusFixture::encode_link(
        LinkSpec::sine(5, 1, 0.1).with_raw_tags(b"NotOpusTags".to_vec()),
    );

    let err = decode(OpusFixture::to_bytes(&link)).unwrap_err();
    assert!(matches!(
        err,
        Error::Open {
            source: OpusError::BadHeader,
            ..
        }
    ));
    assert!(err.to_string().starts_with("Could not open fixture: A required header packet"));
}

#[test]
fn output_gain_scales_samples_unless_disabled() {
    setup_tracing();
    let spec = LinkSpec::sine(9, 1, 0.2);
    let plain = decode(OpusFixture::to_bytes(&OpusFixture::encode_link(spec.clone()))).unwrap();
    let gained_bytes =
        OpusFixture::to_bytes(&OpusFixture::encode_link(spec.with_output_gain(-6 * 256)));

    let gained = decode(gained_bytes.clone()).unwrap();
    assert_eq!(gained.output_gain, -6 * 256);
    let factor = 10f32.powf(-6.0 / 20.0);
    for (p, g) in plain.samples.iter().zip(&gained.samples) {
        assert!((p * factor - g).abs() < 1e-5);
    }

    let raw = decode_bytes(
        gained_bytes,
        "fixture",
        &DecodeSettings::default().with_output_gain(false),
    )
    .unwrap();
    assert_eq!(raw.samples, plain.samples);
}

#[test]
fn streaming_open_decodes_without_totals() {
    setup_tracing();
    let data = OpusFixture::sine_stream(2, 0.4);
    let mut file = OpusFile::open(Cursor::new(data)).unwrap();
    assert!(matches!(file.pcm_total(None), Err(OpusError::Inval)));
    assert_eq!(file.head(None).unwrap().channel_count, 2);
    assert_eq!(
        file.tags(None).map(|t: &OpusTags| t.vendor.as_str()),
        Some(VENDOR)
    );

    let mut buf = vec![0.0f32; 1000];
    let mut frames = 0;
    while let Ok(n) = file.read_float(&mut buf) {
        if n == 0 {
            break;
        }
        assert!(n <= 500);
        frames += n;
    }
    assert_eq!(frames, 19_200);
}

#[rstest]
#[case::zero(0)]
#[case::one_hour(172_800_000)]
#[case::large(1 << 40)]
#[case::huge(1 << 61)]
fn non_zero_start_granule_is_relative(#[case] start: u64) {
    setup_tracing();
    let link = OpusFixture::encode_link(LinkSpec::sine(21, 1, 1.0).with_start_granule(start));
    let data = OpusFixture::to_bytes(&link);

    let file = OpusFile::open_seekable(Cursor::new(data.clone())).unwrap();
    assert_eq!(file.link(Some(0)).unwrap().start_granule, Some(start as i64));
    assert_eq!(file.pcm_total(None).unwrap(), 48_000);

    let audio = decode(data.clone()).unwrap();
    assert_eq!(audio.frames(), 48_000);
    assert!((audio.duration - 1.0).abs() < 1e-6);

    let mut file = OpusFile::open(Cursor::new(data)).unwrap();
    let mut buf = vec![0.0f32; 5760];
    let mut frames = 0;
    loop {
        match file.read_float(&mut buf).unwrap() {
            0 => break,
            n => frames += n,
        }
    }
    assert_eq!(frames, 48_000);
}

#[rstest]
#[case::mono(1, 3)]
#[case::stereo(2, 3)]
#[case::full_page_of_padding(1, PACKETS_PER_PAGE - 2)]
fn end_trim_cuts_across_last_page(#[case] channels: u8, #[case] padding: usize) {
    setup_tracing();
    // Padding packets share the EOS page with the last signal packet, so the
    // final granule lands several packets before the end of the page.
    let spec = LinkSpec::sine(22, channels, 1.0).with_padding_packets(padding);
    let link = OpusFixture::encode_link(spec);
    assert_eq!(link.packets.len(), 51 + padding);

    let audio = decode(OpusFixture::to_bytes(&link)).unwrap();
    assert_eq!(audio.frames(), 48_000);
    assert_eq!(audio.samples.len(), 48_000 * channels as usize);
}

#[rstest]
#[case::before_pre_skip(100)]
#[case::negative((i64::MIN + 1) as u64)]
fn invalid_final_granule_is_bad_timestamp(#[case] granule: u64) {
    setup_tracing();
    let link = OpusFixture::encode_link(LinkSpec::sine(23, 1, 0.2).with_final_granule(granule));
    let data = OpusFixture::to_bytes(&link);

    let err = decode(data.clone()).unwrap_err();
    assert!(matches!(
        err,
        Error::Open {
            source: OpusError::BadTimestamp,
            ..
        }
    ));
    assert!(err.to_string().starts_with("Could not open fixture:"));

    // Without a scan the bad granule surfaces while reading.
    let mut file = OpusFile::open(Cursor::new(data)).unwrap();
    let mut buf = vec![0.0f32; 5760];
    let err = loop {
        match file.read_float(&mut buf) {
            Ok(0) => panic!("stream ended without an error"),
            Ok(_) | Err(OpusError::Hole) => {}
            Err(e) => break e,
        }
    };
    assert!(matches!(err, OpusError::BadTimestamp));
}
