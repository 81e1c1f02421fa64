//! Audio capture abstraction.
//!
//! Everything downstream of capture works on 16 kHz mono f32 PCM; sources
//! are responsible for converting whatever the device delivers.

#[cfg(feature = "microphone")]
pub mod mic;
#[cfg(feature = "microphone")]
pub mod resample;

use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Sample rate every source must deliver.
pub const SAMPLE_RATE: u32 = 16_000;

/// Trailing silence appended before transcription (200 ms at 16 kHz).
/// Whisper tends to truncate the last word without it.
pub const SILENCE_PAD_SAMPLES: usize = (SAMPLE_RATE / 5) as usize;

/// Append the trailing silence pad to a finished capture.
pub fn pad_silence(samples: &mut Vec<f32>) {
    samples.extend(std::iter::repeat_n(0.0f32, SILENCE_PAD_SAMPLES));
}

/// A toggleable source of 16 kHz mono audio.
///
/// `stop` returns everything captured since `start`; `snapshot` copies the
/// samples accumulated so far without ending the capture.
pub trait AudioSource: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<Vec<f32>>;
    fn is_capturing(&self) -> bool;
    fn snapshot(&self) -> Vec<f32>;
}

/// Shared sample accumulator. The capture side appends; consumers only ever
/// get private copies, so a consumer can hold its buffer across a new
/// capture without seeing fresh samples appear in it.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chunk: &[f32]) {
        self.samples
            .lock()
            .expect("capture buffer poisoned")
            .extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().expect("capture buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the samples accumulated so far.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples
            .lock()
            .expect("capture buffer poisoned")
            .clone()
    }

    /// Take all samples, leaving the buffer empty for the next capture.
    pub fn drain(&self) -> Vec<f32> {
        std::mem::take(&mut *self.samples.lock().expect("capture buffer poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_appends_200ms_of_zeros() {
        let mut samples = vec![0.5f32; 100];
        pad_silence(&mut samples);
        assert_eq!(samples.len(), 100 + SILENCE_PAD_SAMPLES);
        assert_eq!(SILENCE_PAD_SAMPLES, 3200);
        assert!(samples[100..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn buffer_snapshots_are_private_copies() {
        let buf = CaptureBuffer::new();
        buf.push(&[0.1, 0.2]);
        let snap = buf.snapshot();
        buf.push(&[0.3]);
        assert_eq!(snap.len(), 2);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buf = CaptureBuffer::new();
        buf.push(&[0.1, 0.2, 0.3]);
        let taken = buf.drain();
        assert_eq!(taken.len(), 3);
        assert!(buf.is_empty());
    }
}
