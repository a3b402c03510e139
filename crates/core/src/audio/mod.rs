mod decode;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use decode::{decode_clip, downmix, i16_to_f32_pcm, DecodeError};

/// One analysis window of normalized mono samples.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate_hz: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn from_i16(samples: &[i16], sample_rate_hz: u32) -> Self {
        Self::new(i16_to_f32_pcm(samples), sample_rate_hz)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_samples(self.sample_rate_hz, self.samples.len())
    }

    /// At most `max_len` samples taken from the middle of the frame.
    pub fn centered_window(&self, max_len: usize) -> &[f32] {
        let n = max_len.min(self.samples.len());
        let start = (self.samples.len() - n) / 2;
        &self.samples[start..start + n]
    }
}

/// A decoded whole recording.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate_hz: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn duration(&self) -> Duration {
        duration_from_samples(self.sample_rate_hz, self.samples.len())
    }

    /// Samples between `start` and `end` seconds, clamped to the clip.
    pub fn span(&self, start_secs: f32, end_secs: f32) -> &[f32] {
        let to_index = |secs: f32| {
            let idx = (secs.max(0.0) * self.sample_rate_hz as f32) as usize;
            idx.min(self.samples.len())
        };
        let start = to_index(start_secs);
        let end = to_index(end_secs).max(start);
        &self.samples[start..end]
    }

    /// Whole clip as a single frame, centered-window logic applies downstream.
    pub fn as_frame(&self) -> AudioFrame {
        AudioFrame::new(self.samples.clone(), self.sample_rate_hz)
    }

    /// Up to `frame_size` samples starting at `start_secs`.
    pub fn frame_at(&self, start_secs: f32, frame_size: usize) -> AudioFrame {
        let span = self.span(start_secs, f32::INFINITY);
        let n = frame_size.min(span.len());
        AudioFrame::new(span[..n].to_vec(), self.sample_rate_hz)
    }

    pub fn frames(&self, frame_size: usize, hop: usize) -> impl Iterator<Item = AudioFrame> + '_ {
        Self::frames_of(&self.samples, self.sample_rate_hz, frame_size, hop)
    }

    /// Overlapping frames of `frame_size` over `samples`, stepping by `hop`.
    /// A trailing partial frame is dropped unless it is the only one.
    pub fn frames_of<'a>(
        samples: &'a [f32],
        sample_rate_hz: u32,
        frame_size: usize,
        hop: usize,
    ) -> impl Iterator<Item = AudioFrame> + 'a {
        let frame_size = frame_size.max(1);
        let hop = hop.max(1);
        let count = if samples.len() <= frame_size {
            usize::from(!samples.is_empty())
        } else {
            (samples.len() - frame_size) / hop + 1
        };
        (0..count).map(move |i| {
            let start = i * hop;
            let end = (start + frame_size).min(samples.len());
            AudioFrame::new(samples[start..end].to_vec(), sample_rate_hz)
        })
    }
}

pub fn duration_from_samples(sample_rate_hz: u32, samples: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(samples as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
