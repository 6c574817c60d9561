//! Raw hardware streams on their way to the remote session.
//!
//! Microphone audio is only forwarded while the interviewer is speaking, so
//! the remote model can notice the candidate cutting in. Camera frames are
//! sampled on a fixed timer regardless of whose turn it is.

use crate::Event;
use crate::session_state::ConversationState;
use anyhow::Result;
use image::DynamicImage;
use interview_native_utils::{audio, video};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Samples per resampler chunk on the microphone path.
pub const MICROPHONE_CHUNK_SIZE: usize = 2048;
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(2000);

/// Whether raw microphone audio may be sent in `state`.
pub fn forwards_microphone(state: ConversationState) -> bool {
    state == ConversationState::AiResponding
}

/// A hardware stream acquired for the session, released on teardown.
pub trait CaptureHandle: Send {
    fn release(&mut self);
}

/// Resamples mono microphone audio to the remote input rate and encodes it.
pub struct MicrophoneUplink {
    resampler: audio::ChunkedResampler,
}

impl MicrophoneUplink {
    pub fn new(input_sample_rate: f64) -> Result<Self> {
        let resampler = audio::ChunkedResampler::new(
            input_sample_rate,
            audio::GEMINI_INPUT_PCM16_SAMPLE_RATE,
            MICROPHONE_CHUNK_SIZE,
        )?;
        Ok(Self { resampler })
    }

    /// Returns a base64 PCM16 payload when `state` lets audio through and a
    /// full chunk is ready. Audio captured while the gate is closed is dropped.
    pub fn sample(&mut self, samples: &[f32], state: ConversationState) -> Option<String> {
        if !forwards_microphone(state) {
            self.reset();
            return None;
        }
        let resampled = self.resampler.push(samples);
        if resampled.is_empty() {
            None
        } else {
            Some(audio::encode(&resampled))
        }
    }

    pub fn reset(&mut self) {
        if self.resampler.pending() > 0 {
            self.resampler.clear();
        }
    }
}

/// The camera. `Ok(None)` means no frame is available right now.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Option<DynamicImage>>;
}

/// Background task posting one compressed camera frame per interval.
pub struct FrameSampler {
    task: JoinHandle<()>,
}

impl FrameSampler {
    pub fn spawn<F>(mut source: F, interval: Duration, tx: mpsc::Sender<Event>) -> Self
    where
        F: FrameSource + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let frame = match source.capture() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::trace!("Camera frame unavailable: {:#}", e);
                        continue;
                    }
                };
                let payload = match video::encode_frame(&frame) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::trace!("Failed to encode camera frame: {:#}", e);
                        continue;
                    }
                };
                match tx.try_send(Event::Frame(payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => tracing::trace!("Event queue full, frame dropped"),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            tracing::debug!("Frame sampler stopped");
        });
        Self { task }
    }
}

impl CaptureHandle for FrameSampler {
    fn release(&mut self) {
        self.task.abort();
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn microphone_is_forwarded_only_while_ai_responds() {
        assert!(forwards_microphone(ConversationState::AiResponding));
        assert!(!forwards_microphone(ConversationState::Listening));
        assert!(!forwards_microphone(ConversationState::UserSpeaking));
        assert!(!forwards_microphone(ConversationState::Processing));
    }

    #[test]
    fn closed_gate_discards_buffered_audio() {
        let mut uplink = MicrophoneUplink::new(16000.0).unwrap();
        let half = vec![0.1; MICROPHONE_CHUNK_SIZE / 2];

        assert_eq!(uplink.sample(&half, ConversationState::AiResponding), None);
        assert_eq!(uplink.resampler.pending(), MICROPHONE_CHUNK_SIZE / 2);

        assert_eq!(uplink.sample(&half, ConversationState::Listening), None);
        assert_eq!(uplink.resampler.pending(), 0);
    }

    #[test]
    fn full_chunk_is_encoded_when_gate_is_open() {
        let mut uplink = MicrophoneUplink::new(48000.0).unwrap();
        let samples = vec![0.25; MICROPHONE_CHUNK_SIZE];
        let payload = uplink
            .sample(&samples, ConversationState::AiResponding)
            .unwrap();
        let decoded = audio::decode(&payload).unwrap();
        // 48 kHz down to 16 kHz.
        assert!(!decoded.is_empty());
        assert!(decoded.len() < MICROPHONE_CHUNK_SIZE / 2);
    }

    struct StillCamera {
        frames: usize,
    }

    impl FrameSource for StillCamera {
        fn capture(&mut self) -> Result<Option<DynamicImage>> {
            self.frames += 1;
            if self.frames % 2 == 0 {
                return Ok(None);
            }
            let image = RgbImage::from_pixel(640, 480, Rgb([10, 200, 30]));
            Ok(Some(DynamicImage::ImageRgb8(image)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_posts_compressed_frames_and_skips_missing_ones() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sampler = FrameSampler::spawn(StillCamera { frames: 0 }, DEFAULT_FRAME_INTERVAL, tx);

        let first = rx.recv().await.unwrap();
        let Event::Frame(payload) = first else {
            panic!("expected a frame event");
        };
        assert!(!payload.is_empty());

        tokio::time::advance(DEFAULT_FRAME_INTERVAL * 2).await;
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Event::Frame(_)));

        sampler.release();
        tokio::task::yield_now().await;
        assert!(rx.recv().await.is_none());
    }
}
