//! Resampling of raw device audio to the pipeline's 16 kHz mono format.

use rubato::{FftFixedIn, Resampler};

use crate::audio::SAMPLE_RATE;
use crate::error::{DiktaError, Result};

/// Resample captured audio to 16 kHz mono.
///
/// Accepts any source rate and channel count; multichannel input is averaged
/// down to mono first.
pub fn resample_to_16k(samples: &[f32], source_rate: u32, channels: u16) -> Result<Vec<f32>> {
    let mono = if channels > 1 {
        downmix_to_mono(samples, channels)
    } else {
        samples.to_vec()
    };

    if source_rate == SAMPLE_RATE {
        return Ok(mono);
    }

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        SAMPLE_RATE as usize,
        1024, // chunk size
        2,    // sub-chunks
        1,    // channels (mono)
    )
    .map_err(|e| DiktaError::Audio(format!("create resampler: {e}")))?;

    let mut output = Vec::new();
    let chunk_size = resampler.input_frames_max();

    for chunk in mono.chunks(chunk_size) {
        let mut padded = chunk.to_vec();
        if padded.len() < chunk_size {
            padded.resize(chunk_size, 0.0);
        }

        let result = resampler
            .process(&[padded], None)
            .map_err(|e| DiktaError::Audio(format!("resample: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}

/// Average all channels of interleaved audio down to one.
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
