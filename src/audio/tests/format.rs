use crate::audio::format::{AudioFormat, BitDepth, SampleRate};

#[test]
fn test_default_is_aes67_baseline() {
    let format = AudioFormat::default();
    assert_eq!(format.sample_rate, SampleRate::Hz48000);
    assert_eq!(format.channels, 2);
    assert_eq!(format.bit_depth, BitDepth::B24);
    assert_eq!(format.encoding_name(), "L24");
}

#[test]
fn test_bytes_per_frame() {
    let format = AudioFormat::new(SampleRate::Hz48000, 2, BitDepth::B24);
    assert_eq!(format.bytes_per_frame(), 6);

    let mono16 = AudioFormat::new(SampleRate::Hz44100, 1, BitDepth::B16);
    assert_eq!(mono16.bytes_per_frame(), 2);

    let wide = AudioFormat::new(SampleRate::Hz96000, 64, BitDepth::B32);
    assert_eq!(wide.bytes_per_frame(), 256);
}

#[test]
fn test_samples_per_packet() {
    let format = AudioFormat::new(SampleRate::Hz48000, 2, BitDepth::B24);
    assert_eq!(format.samples_per_packet(1000), 48);
    assert_eq!(format.samples_per_packet(125), 6);
    assert_eq!(format.samples_per_packet(4000), 192);

    let hires = AudioFormat::new(SampleRate::Hz96000, 2, BitDepth::B24);
    assert_eq!(hires.samples_per_packet(1000), 96);
}

#[test]
fn test_bytes_per_packet() {
    // 48 frames * 2 ch * 3 bytes = 288 per 1 ms packet.
    let format = AudioFormat::new(SampleRate::Hz48000, 2, BitDepth::B24);
    assert_eq!(format.bytes_per_packet(1000), 288);
}

#[test]
fn test_channel_bounds() {
    assert!(!AudioFormat::new(SampleRate::Hz48000, 0, BitDepth::B24).is_valid());
    assert!(AudioFormat::new(SampleRate::Hz48000, 1, BitDepth::B24).is_valid());
    assert!(AudioFormat::new(SampleRate::Hz48000, 64, BitDepth::B24).is_valid());
    assert!(!AudioFormat::new(SampleRate::Hz48000, 65, BitDepth::B24).is_valid());
}

#[test]
fn test_encoding_names() {
    assert_eq!(BitDepth::B16.encoding_name(), "L16");
    assert_eq!(BitDepth::B24.encoding_name(), "L24");
    assert_eq!(BitDepth::B32.encoding_name(), "L32");
    assert_eq!(BitDepth::from_encoding_name("L24"), Some(BitDepth::B24));
    assert_eq!(BitDepth::from_encoding_name("PCMU"), None);
}

#[test]
fn test_rate_conversion() {
    assert_eq!(SampleRate::from_hz(48000), Some(SampleRate::Hz48000));
    assert_eq!(SampleRate::from_hz(22050), None);
    assert_eq!(SampleRate::Hz96000.as_u32(), 96000);
}
