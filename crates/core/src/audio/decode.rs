use super::AudioClip;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "audio::decode";

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unsupported container: {0}")]
    Unsupported(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("audio track has no sample rate")]
    MissingSampleRate,

    #[error("decode failed: {0}")]
    Malformed(String),
}

/// Decodes an in-memory WAV/MP3 file into a mono clip. Multi-channel audio is
/// averaged down to one channel.
pub fn decode_clip(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioClip, DecodeError> {
    let source = MediaSourceStream::new(Box::new(std::io::Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate_hz = params.sample_rate.ok_or(DecodeError::MissingSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count();
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend(downmix(buf.samples(), channels));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "skipping undecodable packet");
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        }
    }

    tracing::debug!(
        target: LOG_TARGET,
        sample_rate_hz,
        samples = samples.len(),
        "decoded clip"
    );
    Ok(AudioClip::new(samples, sample_rate_hz))
}

/// Averages interleaved channels into mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * u32::from(channels) * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn i16_to_f32_basic() {
        let v = i16_to_f32_pcm(&[-32768, -1, 0, 1, 32767]);
        assert!((v[0] + 1.0).abs() < 1e-6);
        assert!((v[2] - 0.0).abs() < 1e-6);
        assert!(v[4] <= 1.0);
        assert!(v[4] > 0.9999);
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }

    #[test]
    fn decodes_stereo_wav_to_mono() {
        let interleaved: Vec<i16> = (0..800).flat_map(|_| [16_384i16, 0i16]).collect();
        let clip = decode_clip(wav_bytes(&interleaved, 8_000, 2), Some("wav")).expect("decodes");
        assert_eq!(clip.sample_rate_hz(), 8_000);
        assert_eq!(clip.samples().len(), 800);
        assert!((clip.samples()[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn rejects_garbage() {
        let err = decode_clip(vec![1, 2, 3, 4, 5], None).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }
}
