// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audio duration measurement.

use std::io::Cursor;

/// Duration of a WAV payload in milliseconds. `None` for anything else.
pub fn wav_duration_ms(data: &[u8]) -> Option<u64> {
    let reader = hound::WavReader::new(Cursor::new(data)).ok()?;
    let sample_rate = u64::from(reader.spec().sample_rate);
    if sample_rate == 0 {
        return None;
    }
    // `duration` counts frames, i.e. samples per channel.
    Some(u64::from(reader.duration()) * 1000 / sample_rate)
}

#[cfg(test)]
pub(crate) fn silent_wav(millis: u32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
        let frames = sample_rate * millis / 1000;
        for _ in 0..frames * u32::from(channels) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer.into_inner()
}
