use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FrameCount, StreamConfig};
use interview_core::Event;
use interview_core::player::{AudioBuffer, PlaybackSink, VoiceId};
use interview_native_utils::audio::{self, ChunkedResampler};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::config::OUTPUT_CHUNK_SIZE;

/// Frames per resampler chunk on the playback path.
const RESAMPLER_CHUNK_SIZE: usize = 100;
/// Seconds of audio the device queue can hold ahead of the speaker.
const OUTPUT_BUFFER_SECONDS: usize = 60;

/// Positions shared by the sink and the output callback, counted in output
/// frames since the speaker opened.
#[derive(Default)]
struct Timeline {
    /// Frames taken from the ring so far.
    played: AtomicU64,
    /// Frames before this position are discarded unheard.
    flush_until: AtomicU64,
    /// End position of every voice still waiting to be heard, in order.
    marks: Mutex<VecDeque<(VoiceId, u64)>>,
}

/// The output callback's half of the device queue.
pub struct Renderer {
    consumer: HeapCons<f32>,
    timeline: Arc<Timeline>,
}

impl Renderer {
    /// Fills an interleaved output buffer from the queue, duplicating the mono
    /// signal on the first two channels. Returns the latest voice that has
    /// been heard to the end; earlier voices are implied.
    pub fn render(&mut self, data: &mut [f32], channels: usize) -> Option<VoiceId> {
        let channels = channels.max(1);
        let mut played = self.timeline.played.load(Ordering::Acquire);
        let flush_until = self.timeline.flush_until.load(Ordering::Acquire);
        if flush_until > played {
            played += self.consumer.skip((flush_until - played) as usize) as u64;
        }

        for frame in data.chunks_mut(channels) {
            let sample = match self.consumer.try_pop() {
                Some(sample) => {
                    played += 1;
                    sample
                }
                None => 0.0,
            };
            for (channel, out) in frame.iter_mut().enumerate() {
                *out = if channel < 2 { sample } else { 0.0 };
            }
        }
        self.timeline.played.store(played, Ordering::Release);

        // Never wait on the sink; a contended queue reports on the next callback.
        let mut marks = self.timeline.marks.try_lock().ok()?;
        let mut finished = None;
        while marks.front().is_some_and(|(_, end)| *end <= played) {
            finished = marks.pop_front().map(|(voice, _)| voice);
        }
        finished
    }
}

/// Schedules voices on the output device back to back. Completions come back
/// through the output callback as `Event::PlaybackFinished`.
pub struct DeviceSink {
    producer: HeapProd<f32>,
    timeline: Arc<Timeline>,
    resampler: Option<ChunkedResampler>,
    written: u64,
    latest: Option<VoiceId>,
}

/// Creates the device queue for a speaker running at `output_sample_rate`.
pub fn device_queue(capacity: usize, output_sample_rate: f64) -> Result<(DeviceSink, Renderer)> {
    let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
    let timeline = Arc::new(Timeline::default());
    let resampler = if output_sample_rate == audio::GEMINI_OUTPUT_PCM16_SAMPLE_RATE {
        None
    } else {
        Some(ChunkedResampler::new(
            audio::GEMINI_OUTPUT_PCM16_SAMPLE_RATE,
            output_sample_rate,
            RESAMPLER_CHUNK_SIZE,
        )?)
    };
    let sink = DeviceSink {
        producer,
        timeline: timeline.clone(),
        resampler,
        written: 0,
        latest: None,
    };
    Ok((sink, Renderer { consumer, timeline }))
}

impl PlaybackSink for DeviceSink {
    fn play(&mut self, voice: VoiceId, buffer: AudioBuffer) {
        let samples = match self.resampler.as_mut() {
            Some(resampler) => {
                // Leftovers from a response the speaker already finished.
                if self.timeline.played.load(Ordering::Acquire) >= self.written {
                    resampler.clear();
                }
                resampler.push(&buffer.samples)
            }
            None => buffer.samples,
        };
        let pushed = self.producer.push_slice(&samples);
        if pushed < samples.len() {
            tracing::warn!(
                "Playback queue full, dropped {} samples of voice {}",
                samples.len() - pushed,
                voice
            );
        }
        self.written += pushed as u64;
        self.latest = Some(voice);
        match self.timeline.marks.lock() {
            Ok(mut marks) => marks.push_back((voice, self.written)),
            Err(e) => tracing::error!("Playback queue poisoned: {}", e),
        }
    }

    /// Discards everything queued up to and including `voice`.
    fn stop(&mut self, voice: VoiceId) {
        if self.latest != Some(voice) {
            tracing::trace!("Ignoring stop of superseded voice {}", voice);
            return;
        }
        self.timeline
            .flush_until
            .store(self.written, Ordering::Release);
        if let Ok(mut marks) = self.timeline.marks.lock() {
            marks.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.clear();
        }
        self.latest = None;
    }
}

pub struct Speaker {
    pub stream: cpal::Stream,
    pub sink: DeviceSink,
}

/// Opens `device` and starts rendering whatever the sink queues.
pub fn open(device: &Device, events: mpsc::Sender<Event>) -> Result<Speaker> {
    tracing::info!("Using output device: {:?}", device.name()?);
    for config in device.supported_output_configs()? {
        tracing::debug!("Supported output config: {:?}", config);
    }

    let default_config = device
        .default_output_config()
        .context("Failed to get default output config")?;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0 as usize;
    tracing::info!("Output stream config: {:?}", &config);

    let (sink, mut renderer) =
        device_queue(sample_rate * OUTPUT_BUFFER_SECONDS, sample_rate as f64)?;
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if let Some(voice) = renderer.render(data, channels) {
            if let Err(e) = events.try_send(Event::PlaybackFinished(voice)) {
                tracing::warn!("Failed to report end of voice {}: {}", voice, e);
            }
        }
    };

    let stream = device
        .build_output_stream(
            &config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )
        .context("Failed to open the speaker")?;
    stream.play().context("Failed to start the speaker")?;

    Ok(Speaker { stream, sink })
}
