#![allow(dead_code)]

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Unique scratch path so parallel tests never collide.
pub fn temp_wav(hint: &str) -> PathBuf {
    std::env::temp_dir().join(format!("speechscan-test-{hint}-{}.wav", Uuid::new_v4()))
}

/// Fresh scratch directory for tests that need to observe temp-file cleanup.
pub fn temp_dir(hint: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("speechscan-test-{hint}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_pcm16(path: &Path, sample_rate: u32, channels: u16, interleaved: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in interleaved {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

pub fn write_pcm8_mono(path: &Path, sample_rate: u32, samples: &[i8]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}

pub fn silence(seconds: f64, sample_rate: u32) -> Vec<i16> {
    vec![0; (seconds * sample_rate as f64) as usize]
}

/// Harmonic-rich buzz with a slow amplitude envelope, loud enough for the
/// VAD engine to pick up but nothing like full scale.
pub fn voiced_tone(seconds: f64, sample_rate: u32) -> Vec<i16> {
    let count = (seconds * sample_rate as f64) as usize;
    (0..count)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let envelope = 0.6 + 0.4 * (2.0 * std::f64::consts::PI * 4.0 * t).sin();
            let fundamental = (2.0 * std::f64::consts::PI * 120.0 * t).sin();
            let second = 0.6 * (2.0 * std::f64::consts::PI * 240.0 * t).sin();
            let third = 0.4 * (2.0 * std::f64::consts::PI * 480.0 * t).sin();
            let value = envelope * (fundamental + second + third) / 2.0;
            (value * 0.3 * i16::MAX as f64) as i16
        })
        .collect()
}
