use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FrameCount, StreamConfig};
use interview_core::Event;
use interview_core::uplink::CaptureHandle;
use interview_native_utils::audio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::config::INPUT_CHUNK_SIZE;

/// A detachable second consumer of the microphone stream.
///
/// The speech recognizer attaches while it runs. The capture callback never
/// blocks on the slot: if it is busy the block is skipped.
#[derive(Clone, Default)]
pub struct AudioTap {
    slot: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
}

impl AudioTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, capacity: usize) -> mpsc::Receiver<Vec<f32>> {
        let (tx, rx) = mpsc::channel(capacity);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tx);
        }
        rx
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    pub fn feed(&self, samples: &[f32]) {
        if let Ok(slot) = self.slot.try_lock() {
            if let Some(tx) = slot.as_ref() {
                if tx.try_send(samples.to_vec()).is_err() {
                    tracing::trace!("Recognizer audio queue full, block dropped");
                }
            }
        }
    }
}

/// The session's hold on the microphone. Releasing it silences the capture
/// callback; the cpal stream itself stays with the thread that built it.
pub struct MicrophoneCapture {
    released: Arc<AtomicBool>,
}

impl CaptureHandle for MicrophoneCapture {
    fn release(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("Microphone released");
        }
    }
}

pub struct Microphone {
    pub stream: cpal::Stream,
    pub sample_rate: f64,
    pub capture: MicrophoneCapture,
}

/// Opens `device` and starts posting mono blocks to the controller and the tap.
pub fn open(device: &Device, events: mpsc::Sender<Event>, tap: AudioTap) -> Result<Microphone> {
    tracing::info!("Using input device: {:?}", device.name()?);
    for config in device.supported_input_configs()? {
        tracing::debug!("Supported input config: {:?}", config);
    }

    let default_config = device
        .default_input_config()
        .context("Failed to get default input config")?;
    // Default channels and sample rate, but with a fixed buffer size.
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channels = config.channels as usize;
    tracing::info!("Input stream config: {:?}", &config);

    let released = Arc::new(AtomicBool::new(false));
    let callback_released = released.clone();
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if callback_released.load(Ordering::Relaxed) {
            return;
        }
        let mono = audio::downmix_to_mono(data, channels);
        tap.feed(&mono);
        if let Err(e) = events.try_send(Event::Microphone(mono)) {
            tracing::trace!("Failed to post microphone block: {}", e);
        }
    };

    let stream = device
        .build_input_stream(
            &config,
            input_data_fn,
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )
        .context("Failed to open the microphone")?;
    stream.play().context("Failed to start the microphone")?;

    Ok(Microphone {
        stream,
        sample_rate: config.sample_rate.0 as f64,
        capture: MicrophoneCapture { released },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_delivers_only_while_attached() {
        let tap = AudioTap::new();
        tap.feed(&[0.1, 0.2]);

        let mut rx = tap.attach(4);
        tap.feed(&[0.3, 0.4]);
        assert_eq!(rx.try_recv().unwrap(), vec![0.3, 0.4]);

        tap.detach();
        tap.feed(&[0.5]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn releasing_the_capture_is_idempotent() {
        let released = Arc::new(AtomicBool::new(false));
        let mut capture = MicrophoneCapture {
            released: released.clone(),
        };
        capture.release();
        capture.release();
        assert!(released.load(Ordering::SeqCst));
    }
}
