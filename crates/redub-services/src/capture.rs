//! Microphone capture for vocal takes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, StreamConfig};
use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input devices found")]
    NoDevices,
    #[error("input device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to get input config: {0}")]
    Config(String),
    #[error("failed to build input stream: {0}")]
    Stream(String),
}

/// Format of an open capture stream.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Live input level readout (lock-free reads from the UI thread).
pub struct CaptureMeter {
    peak_raw: AtomicU32,
    rms_raw: AtomicU32,
}

impl CaptureMeter {
    pub fn new() -> Self {
        Self {
            peak_raw: AtomicU32::new(0),
            rms_raw: AtomicU32::new(0),
        }
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_raw.load(Ordering::Relaxed))
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms_raw.load(Ordering::Relaxed))
    }

    fn set_peak(&self, val: f32) {
        self.peak_raw.store(val.to_bits(), Ordering::Relaxed);
    }

    fn set_rms(&self, val: f32) {
        self.rms_raw.store(val.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.set_peak(0.0);
        self.set_rms(0.0);
    }
}

impl Default for CaptureMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Seam between the timeline engine and the audio input device.
///
/// Chunks of interleaved f32 samples arrive on the channel in real-time
/// order; the engine drains them when the take stops.
pub trait CaptureStream {
    fn open(
        &mut self,
        chunks: Sender<Vec<f32>>,
        meter: Arc<CaptureMeter>,
    ) -> Result<CaptureFormat, CaptureError>;

    /// Close the stream. Safe to call when no stream is open.
    fn close(&mut self);
}

struct StreamHandle {
    stop_flag: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// cpal-backed capture from a named input device (or "default").
pub struct CpalCapture {
    device_id: String,
    handle: Option<StreamHandle>,
}

impl CpalCapture {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            handle: None,
        }
    }

    fn get_device(&self) -> Result<Device, CaptureError> {
        let host = cpal::default_host();

        if self.device_id == "default" {
            return host.default_input_device().ok_or(CaptureError::NoDevices);
        }

        for device in host
            .input_devices()
            .map_err(|e| CaptureError::Config(e.to_string()))?
        {
            if let Ok(name) = device.name() {
                if name == self.device_id {
                    return Ok(device);
                }
            }
        }

        Err(CaptureError::DeviceNotFound(self.device_id.clone()))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        tx: Sender<Vec<f32>>,
        meter: Arc<CaptureMeter>,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<cpal::Stream, CaptureError>
    where
        T: cpal::Sample + cpal::SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let samples: Vec<f32> = data.iter().map(|s| f32::from_sample_(*s)).collect();

                    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
                    let rms = if samples.is_empty() {
                        0.0
                    } else {
                        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
                    };
                    meter.set_peak(peak);
                    meter.set_rms(rms);

                    let _ = tx.send(samples);
                },
                |err| error!("Input stream error: {}", err),
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }
}

impl CaptureStream for CpalCapture {
    fn open(
        &mut self,
        chunks: Sender<Vec<f32>>,
        meter: Arc<CaptureMeter>,
    ) -> Result<CaptureFormat, CaptureError> {
        let device = self.get_device()?;
        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Config(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let stream_config: StreamConfig = config.clone().into();

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &stream_config, chunks, meter, stop_clone)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &stream_config, chunks, meter, stop_clone)
            }
            SampleFormat::I32 => {
                Self::build_stream::<i32>(&device, &stream_config, chunks, meter, stop_clone)
            }
            format => return Err(CaptureError::Config(format!("Unsupported format: {:?}", format))),
        }?;

        stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Capture stream opened"
        );

        self.handle = Some(StreamHandle {
            stop_flag,
            _stream: stream,
        });

        Ok(CaptureFormat {
            sample_rate,
            channels,
        })
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop_flag.store(true, Ordering::SeqCst);
            info!("Capture stream closed");
        }
    }
}
