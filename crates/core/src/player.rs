use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use std::collections::VecDeque;

use interview_native_utils::audio;

/// Identifies one started buffer. Completion notices carry the voice they
/// belong to so a stopped voice can never advance the queue.
pub type VoiceId = u64;

/// Decoded mono audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes a base64 little-endian PCM16 chunk as sent by the remote session.
    pub fn from_pcm16_base64(data: &str) -> Result<Self> {
        let samples = audio::decode(data)?;
        if samples.is_empty() {
            anyhow::bail!("Audio chunk decoded to no samples");
        }
        Ok(Self::new(
            samples,
            audio::GEMINI_OUTPUT_PCM16_SAMPLE_RATE as u32,
        ))
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// The output device. Voices passed to `play` are heard back to back in call
/// order; the sink reports the end of each as `Event::PlaybackFinished(voice)`.
/// A notice may cover several voices at once: a finished voice implies every
/// voice scheduled before it finished too.
#[cfg_attr(test, automock)]
pub trait PlaybackSink {
    fn play(&mut self, voice: VoiceId, buffer: AudioBuffer);
    /// Silences `voice` and everything scheduled before it immediately. No
    /// completion is expected afterwards.
    fn stop(&mut self, voice: VoiceId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackProgress {
    /// Later voices are still playing.
    Continuing,
    /// Nothing is playing and nothing is scheduled.
    Drained,
    /// The notice was for a voice that is no longer scheduled.
    Stale,
}

/// Plays remote audio chunks back to back in arrival order.
///
/// Chunks are handed to the sink as soon as they arrive so the device never
/// waits on a completion round trip between two of them.
pub struct ResponsePlayer<S: PlaybackSink> {
    sink: S,
    last_voice: VoiceId,
    scheduled: VecDeque<VoiceId>,
}

impl<S: PlaybackSink> ResponsePlayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last_voice: 0,
            scheduled: VecDeque::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        !self.scheduled.is_empty()
    }

    /// Voices waiting behind the one being heard.
    pub fn queued(&self) -> usize {
        self.scheduled.len().saturating_sub(1)
    }

    pub fn enqueue(&mut self, buffer: AudioBuffer) {
        self.last_voice += 1;
        let voice = self.last_voice;
        tracing::trace!("Scheduling voice {} ({} ms)", voice, buffer.duration_ms());
        self.scheduled.push_back(voice);
        self.sink.play(voice, buffer);
    }

    pub fn on_finished(&mut self, voice: VoiceId) -> PlaybackProgress {
        let Some(position) = self.scheduled.iter().position(|v| *v == voice) else {
            tracing::trace!("Ignoring completion of inactive voice {}", voice);
            return PlaybackProgress::Stale;
        };
        self.scheduled.drain(..=position);
        if self.scheduled.is_empty() {
            PlaybackProgress::Drained
        } else {
            PlaybackProgress::Continuing
        }
    }

    /// Silences the device and forgets everything scheduled.
    pub fn interrupt(&mut self) {
        if let Some(latest) = self.scheduled.back().copied() {
            tracing::debug!("Discarding {} scheduled audio chunks", self.scheduled.len());
            self.scheduled.clear();
            self.sink.stop(latest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn chunk(marker: f32) -> AudioBuffer {
        AudioBuffer::new(vec![marker; 240], 24000)
    }

    fn expect_play(sink: &mut MockPlaybackSink, seq: &mut Sequence, voice: VoiceId, marker: f32) {
        sink.expect_play()
            .withf(move |v, buffer| *v == voice && buffer.samples[0] == marker)
            .times(1)
            .in_sequence(seq)
            .return_const(());
    }

    #[test]
    fn chunks_are_scheduled_on_arrival_and_finish_in_order() {
        let mut sink = MockPlaybackSink::new();
        let mut seq = Sequence::new();
        expect_play(&mut sink, &mut seq, 1, 0.1);
        expect_play(&mut sink, &mut seq, 2, 0.2);
        expect_play(&mut sink, &mut seq, 3, 0.3);
        sink.expect_stop().never();

        let mut player = ResponsePlayer::new(sink);
        player.enqueue(chunk(0.1));
        player.enqueue(chunk(0.2));
        player.enqueue(chunk(0.3));
        assert!(player.is_playing());
        assert_eq!(player.queued(), 2);

        assert_eq!(player.on_finished(1), PlaybackProgress::Continuing);
        assert_eq!(player.on_finished(2), PlaybackProgress::Continuing);
        assert_eq!(player.on_finished(3), PlaybackProgress::Drained);
        assert!(!player.is_playing());
    }

    #[test]
    fn a_later_completion_covers_earlier_voices() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_play().times(3).return_const(());

        let mut player = ResponsePlayer::new(sink);
        for marker in [0.1, 0.2, 0.3] {
            player.enqueue(chunk(marker));
        }
        assert_eq!(player.on_finished(2), PlaybackProgress::Continuing);
        assert_eq!(player.on_finished(1), PlaybackProgress::Stale);
        assert_eq!(player.queued(), 0);
        assert_eq!(player.on_finished(3), PlaybackProgress::Drained);
    }

    #[test]
    fn interrupt_silences_everything_scheduled() {
        let mut sink = MockPlaybackSink::new();
        let mut seq = Sequence::new();
        expect_play(&mut sink, &mut seq, 1, 0.1);
        expect_play(&mut sink, &mut seq, 2, 0.2);
        expect_play(&mut sink, &mut seq, 3, 0.3);
        sink.expect_stop()
            .withf(|v| *v == 3)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        expect_play(&mut sink, &mut seq, 4, 0.9);

        let mut player = ResponsePlayer::new(sink);
        player.enqueue(chunk(0.1));
        player.enqueue(chunk(0.2));
        player.enqueue(chunk(0.3));
        assert_eq!(player.on_finished(1), PlaybackProgress::Continuing);

        player.interrupt();
        assert!(!player.is_playing());
        assert_eq!(player.queued(), 0);

        // A stopped voice reporting in late is ignored.
        assert_eq!(player.on_finished(2), PlaybackProgress::Stale);

        player.enqueue(chunk(0.9));
        assert!(player.is_playing());
    }

    #[test]
    fn interrupt_when_idle_is_a_no_op() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_stop().never();
        let mut player = ResponsePlayer::new(sink);
        player.interrupt();
        assert_eq!(player.on_finished(7), PlaybackProgress::Stale);
    }

    #[test]
    fn pcm16_chunks_decode_at_the_remote_output_rate() {
        let encoded = audio::encode(&[0.0, 0.5, -0.5, 0.25]);
        let buffer = AudioBuffer::from_pcm16_base64(&encoded).unwrap();
        assert_eq!(buffer.sample_rate, 24000);
        assert_eq!(buffer.samples.len(), 4);
        assert!((buffer.samples[1] - 0.5).abs() < 1e-3);

        assert!(AudioBuffer::from_pcm16_base64("not base64!").is_err());
    }
}
