use rehearse_native_utils::audio::{PcmError, pcm16_to_f32};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// One encoded speech payload as it arrived from the provider. Its place in
/// the queue is its only ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed pcm payload: {0}")]
    Pcm(#[from] PcmError),
    #[error("decoder configured with a zero sample rate")]
    ZeroSampleRate,
}

pub trait ChunkDecoder: Send + Sync {
    fn decode(&self, chunk: &AudioChunk) -> Result<DecodedAudio, DecodeError>;
}

/// Decoder for raw little-endian mono PCM16 at a fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct Pcm16Decoder {
    pub sample_rate: u32,
}

impl Pcm16Decoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl ChunkDecoder for Pcm16Decoder {
    fn decode(&self, chunk: &AudioChunk) -> Result<DecodedAudio, DecodeError> {
        if self.sample_rate == 0 {
            return Err(DecodeError::ZeroSampleRate);
        }
        Ok(DecodedAudio {
            samples: pcm16_to_f32(&chunk.0)?,
            sample_rate: self.sample_rate,
        })
    }
}

/// Source of "now" in seconds on the playback timeline.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Seconds since construction, on tokio's clock so paused-time tests can drive it.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A chunk with its slot on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChunk {
    pub start: f64,
    pub duration: f64,
    pub audio: DecodedAudio,
    /// Bumped by every interruption. A sink drops anything from an older generation.
    pub generation: u64,
}

/// Where scheduled audio ends up: a device, a file, or nowhere.
pub trait AudioSink: Send + Sync {
    fn play(&self, chunk: &ScheduledChunk);
    /// Cuts off whatever is currently sounding.
    fn stop(&self);
}

enum Slot {
    Raw(AudioChunk),
    Decoded(DecodedAudio),
}

struct QueueInner {
    slots: VecDeque<Slot>,
    cursor: f64,
    generation: u64,
    closed: bool,
}

/// FIFO of speech for the active session.
///
/// Chunks never overlap: each starts at `max(now, cursor)` and pushes the
/// cursor forward by its own duration. An interruption empties the queue and
/// pulls the cursor back to now.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<QueueInner>>,
    decoder: Arc<dyn ChunkDecoder>,
    version: Arc<watch::Sender<u64>>,
}

impl PlaybackQueue {
    pub fn new(decoder: Arc<dyn ChunkDecoder>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                slots: VecDeque::new(),
                cursor: 0.0,
                generation: 0,
                closed: false,
            })),
            decoder,
            version: Arc::new(version),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Receiver that ticks whenever the queue changes or playback goes idle.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn enqueue(&self, chunk: AudioChunk) {
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.slots.push_back(Slot::Raw(chunk));
        }
        self.notify();
    }

    /// Takes the next playable chunk and gives it a slot on the timeline.
    ///
    /// Chunks that fail to decode are skipped. The chunk after the returned
    /// one is decoded ahead of time.
    pub fn schedule_next(&self, now: f64) -> Option<ScheduledChunk> {
        let mut inner = self.lock();
        let audio = loop {
            match inner.slots.pop_front()? {
                Slot::Decoded(audio) => break audio,
                Slot::Raw(chunk) => match self.decoder.decode(&chunk) {
                    Ok(audio) => break audio,
                    Err(err) => tracing::warn!(error = %err, "skipping undecodable audio chunk"),
                },
            }
        };

        let start = now.max(inner.cursor);
        let duration = audio.duration();
        inner.cursor = start + duration;

        let predecoded = match inner.slots.front() {
            Some(Slot::Raw(next)) => self.decoder.decode(next).ok(),
            _ => None,
        };
        if let Some(decoded) = predecoded {
            inner.slots[0] = Slot::Decoded(decoded);
        }

        Some(ScheduledChunk {
            start,
            duration,
            audio,
            generation: inner.generation,
        })
    }

    /// Barge-in: drops queued audio, resets the cursor to `now`, and starts a
    /// new generation. Safe to call any number of times.
    pub fn interrupt(&self, now: f64) {
        {
            let mut inner = self.lock();
            let had_audio = !inner.slots.is_empty() || inner.cursor > now;
            inner.slots.clear();
            inner.cursor = now;
            if had_audio {
                inner.generation += 1;
                tracing::debug!(generation = inner.generation, "playback interrupted");
            }
        }
        self.notify();
    }

    pub fn is_speaking(&self, now: f64) -> bool {
        let inner = self.lock();
        !inner.slots.is_empty() || inner.cursor > now
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// When the last scheduled chunk finishes.
    pub fn cursor(&self) -> f64 {
        self.lock().cursor
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Resolves once nothing is queued and the last scheduled chunk has finished.
    pub async fn wait_drained(&self, clock: &dyn AudioClock) {
        let mut changes = self.subscribe();
        loop {
            let now = clock.now();
            let (queued, cursor, closed) = {
                let inner = self.lock();
                (!inner.slots.is_empty(), inner.cursor, inner.closed)
            };
            if closed || (!queued && cursor <= now) {
                return;
            }
            let wait = if queued {
                Duration::from_millis(50)
            } else {
                Duration::from_secs_f64(cursor - now)
            };
            tokio::select! {
                _ = changes.changed() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Stops accepting audio and wakes every waiter.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.slots.clear();
            inner.generation += 1;
        }
        self.notify();
    }
}

/// Feeds the sink one chunk at a time, keeping one chunk ahead of the sound.
///
/// This worker is the only thing that decides when audio starts. It returns
/// once the queue is closed.
pub async fn run_playback(queue: PlaybackQueue, clock: Arc<dyn AudioClock>, sink: Arc<dyn AudioSink>) {
    let mut changes = queue.subscribe();
    let mut generation = queue.generation();
    let mut was_speaking = false;

    loop {
        if queue.is_closed() {
            sink.stop();
            break;
        }
        let current = queue.generation();
        if current != generation {
            sink.stop();
            generation = current;
        }

        let now = clock.now();
        if let Some(chunk) = queue.schedule_next(now) {
            was_speaking = true;
            sink.play(&chunk);
            let lead = (chunk.start - now).max(0.0);
            tokio::select! {
                _ = changes.changed() => {}
                _ = tokio::time::sleep(Duration::from_secs_f64(lead)) => {}
            }
            continue;
        }

        let tail = queue.cursor() - now;
        if tail > 0.0 {
            tokio::select! {
                _ = changes.changed() => {}
                _ = tokio::time::sleep(Duration::from_secs_f64(tail)) => {}
            }
            continue;
        }

        if was_speaking {
            was_speaking = false;
            queue.notify();
        }
        if changes.changed().await.is_err() {
            break;
        }
    }
    tracing::debug!("playback worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1_000;

    fn chunk_of(seconds: f64) -> AudioChunk {
        let samples = (seconds * RATE as f64) as usize;
        AudioChunk(vec![0u8; samples * 2])
    }

    fn queue() -> PlaybackQueue {
        PlaybackQueue::new(Arc::new(Pcm16Decoder::new(RATE)))
    }

    #[test]
    fn test_chunks_are_laid_end_to_end() {
        let queue = queue();
        for seconds in [1.0, 0.5, 2.0] {
            queue.enqueue(chunk_of(seconds));
        }
        let starts: Vec<f64> = std::iter::from_fn(|| queue.schedule_next(0.0))
            .map(|c| c.start)
            .collect();
        assert_eq!(starts, vec![0.0, 1.0, 1.5]);
        assert_eq!(queue.cursor(), 3.5);
    }

    #[test]
    fn test_late_chunk_starts_at_now() {
        let queue = queue();
        queue.enqueue(chunk_of(1.0));
        queue.schedule_next(0.0);
        queue.enqueue(chunk_of(1.0));
        assert_eq!(queue.schedule_next(4.0).unwrap().start, 4.0);
    }

    #[test]
    fn test_undecodable_chunk_is_skipped() {
        let queue = queue();
        queue.enqueue(AudioChunk(vec![1, 2, 3]));
        queue.enqueue(chunk_of(0.5));
        let next = queue.schedule_next(0.0).unwrap();
        assert_eq!(next.duration, 0.5);
        assert!(queue.schedule_next(0.0).is_none());
    }

    #[test]
    fn test_interrupt_is_immediate_and_idempotent() {
        let queue = queue();
        for seconds in [1.0, 1.0, 1.0] {
            queue.enqueue(chunk_of(seconds));
        }
        queue.schedule_next(0.0);
        assert!(queue.is_speaking(0.5));

        queue.interrupt(0.5);
        assert!(queue.is_empty());
        assert!(!queue.is_speaking(0.5));
        let generation = queue.generation();

        queue.interrupt(0.5);
        assert!(queue.is_empty());
        assert!(!queue.is_speaking(0.5));
        assert_eq!(queue.generation(), generation);

        queue.enqueue(chunk_of(1.0));
        assert_eq!(queue.schedule_next(0.5).unwrap().start, 0.5);
    }

    #[test]
    fn test_next_chunk_is_predecoded() {
        let queue = queue();
        queue.enqueue(chunk_of(0.1));
        queue.enqueue(chunk_of(0.2));
        queue.schedule_next(0.0);
        assert!(matches!(queue.lock().slots.front(), Some(Slot::Decoded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_drained_resolves_after_last_chunk() {
        let clock = MonotonicClock::new();
        let queue = queue();
        queue.enqueue(chunk_of(2.0));
        queue.schedule_next(clock.now());

        let started = tokio::time::Instant::now();
        queue.wait_drained(&clock).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(!queue.is_speaking(clock.now()));
    }

    struct RecordingSink {
        played: Mutex<Vec<f64>>,
        stops: Mutex<u32>,
    }

    impl AudioSink for RecordingSink {
        fn play(&self, chunk: &ScheduledChunk) {
            self.played.lock().unwrap().push(chunk.start);
        }
        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_plays_in_order_and_stops_on_close() {
        let clock: Arc<dyn AudioClock> = Arc::new(MonotonicClock::new());
        let sink = Arc::new(RecordingSink {
            played: Mutex::new(Vec::new()),
            stops: Mutex::new(0),
        });
        let queue = queue();
        for seconds in [1.0, 0.5] {
            queue.enqueue(chunk_of(seconds));
        }
        let worker = tokio::spawn(run_playback(queue.clone(), clock.clone(), sink.clone()));

        queue.wait_drained(clock.as_ref()).await;
        queue.close();
        worker.await.unwrap();

        let played = sink.played.lock().unwrap().clone();
        assert_eq!(played.len(), 2);
        assert!(played[1] >= played[0] + 1.0);
        assert!(*sink.stops.lock().unwrap() >= 1);
    }
}
