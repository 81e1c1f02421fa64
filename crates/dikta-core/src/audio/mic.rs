//! Microphone capture via cpal.
//!
//! A cpal `Stream` is not `Send`, so the stream lives on a dedicated capture
//! thread for the duration of a recording. The thread appends raw device
//! samples into a [`CaptureBuffer`]; conversion to 16 kHz mono happens when
//! a consumer asks for samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};

use crate::audio::resample::resample_to_16k;
use crate::audio::{AudioSource, CaptureBuffer};
use crate::error::{DiktaError, Result};
use crate::verbose;

/// Stream errors seen during the current capture. ALSA produces these in
/// bursts on some USB devices without affecting the recording, so they are
/// counted and rate-limited instead of surfaced.
static STREAM_ERROR_COUNT: AtomicU64 = AtomicU64::new(0);

pub struct MicSource {
    device_name: Option<String>,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
    buffer: CaptureBuffer,
    source_rate: u32,
    channels: u16,
}

impl MicSource {
    /// Capture from the system default input device.
    pub fn new() -> Self {
        Self {
            device_name: None,
            worker: None,
        }
    }

    /// Capture from a named input device.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            worker: None,
        }
    }

    fn convert(&self, raw: Vec<f32>, rate: u32, channels: u16) -> Result<Vec<f32>> {
        resample_to_16k(&raw, rate, channels)
    }
}

impl Default for MicSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MicSource {
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(DiktaError::Audio("capture already running".into()));
        }

        STREAM_ERROR_COUNT.store(0, Ordering::Relaxed);

        let buffer = CaptureBuffer::new();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u16)>>(1);

        let device_name = self.device_name.clone();
        let thread_buffer = buffer.clone();

        let handle = thread::Builder::new()
            .name("dikta-capture".into())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), thread_buffer) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until stop (or the source is dropped).
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DiktaError::Audio(format!("spawn capture thread: {e}")))?;

        let (source_rate, channels) = ready_rx
            .recv()
            .map_err(|_| DiktaError::Audio("capture thread exited early".into()))??;

        verbose!("Capturing at {source_rate} Hz, {channels} channel(s)");

        self.worker = Some(Worker {
            stop_tx,
            handle,
            buffer,
            source_rate,
            channels,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<f32>> {
        let Some(worker) = self.worker.take() else {
            return Ok(Vec::new());
        };

        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            return Err(DiktaError::Audio("capture thread panicked".into()));
        }

        let errors = STREAM_ERROR_COUNT.load(Ordering::Relaxed);
        if errors > 0 {
            verbose!("Capture finished with {errors} non-fatal stream errors");
        }

        let raw = worker.buffer.drain();
        self.convert(raw, worker.source_rate, worker.channels)
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn snapshot(&self) -> Vec<f32> {
        let Some(worker) = &self.worker else {
            return Vec::new();
        };
        let raw = worker.buffer.snapshot();
        self.convert(raw, worker.source_rate, worker.channels)
            .unwrap_or_default()
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
    buffer: CaptureBuffer,
) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => find_device(&host, name)?,
        None => host
            .default_input_device()
            .ok_or_else(|| DiktaError::Audio("no default input device".into()))?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| DiktaError::Audio(format!("query input config: {e}")))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let rate = config.sample_rate.0;
    let channels = config.channels;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, buffer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, buffer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, buffer)?,
        other => {
            return Err(DiktaError::Audio(format!(
                "unsupported sample format {other:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| DiktaError::Audio(format!("start stream: {e}")))?;
    Ok((stream, rate, channels))
}

fn find_device(host: &cpal::Host, name: &str) -> Result<Device> {
    let devices = host
        .input_devices()
        .map_err(|e| DiktaError::Audio(format!("enumerate input devices: {e}")))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(DiktaError::Audio(format!("input device '{name}' not found")))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, buffer: CaptureBuffer) -> Result<Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let err_fn = |err| {
        let count = STREAM_ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
        if count == 0 {
            verbose!("Audio stream error (non-fatal): {err}");
        } else if count % 1000 == 0 {
            verbose!("Audio stream: {count} non-fatal errors so far");
        }
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<f32> = data
                    .iter()
                    .map(|&s| cpal::Sample::from_sample(s))
                    .collect();
                buffer.push(&chunk);
            },
            err_fn,
            None,
        )
        .map_err(|e| DiktaError::Audio(format!("build input stream: {e}")))
}
