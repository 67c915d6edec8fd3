//! Speaker ownership and gapless playback scheduling.
//!
//! Chunks arrive asynchronously and at uneven intervals; the scheduler
//! lines each one up so chunk *n+1* starts exactly where chunk *n* ends
//! (`start = max(previous_end, device_now)`). All live sources are tracked
//! in a set so barge-in and session teardown can silence everything
//! atomically. Idleness is published through a `watch` channel so the
//! controller gets a drained notification instead of having to poll on a
//! timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::audio::encode::AudioChunk;
use crate::errors::DeviceError;

/// A speaker backend: a PCM sink with a monotonic device clock.
pub trait SpeakerSink: Send {
    /// Current device time in seconds.
    fn now(&self) -> f64;

    /// Submit a buffer to start playing at device time `start`.
    fn play_at(&mut self, chunk: &AudioChunk, start: f64) -> Result<(), DeviceError>;

    /// Stop everything currently scheduled or audible.
    fn stop_all(&mut self);
}

/// A sink with a real clock and no audible output. Used when the `devices`
/// feature is off and by timing tests.
pub struct NullSink {
    origin: tokio::time::Instant,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakerSink for NullSink {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn play_at(&mut self, _chunk: &AudioChunk, _start: f64) -> Result<(), DeviceError> {
        Ok(())
    }

    fn stop_all(&mut self) {}
}

/// Live handle over one scheduled chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: u64,
    pub start: f64,
    pub end: f64,
}

struct Inner {
    sink: Box<dyn SpeakerSink>,
    /// End time of the last scheduled chunk; zero after cancel.
    next_start: f64,
    active: HashMap<u64, ScheduledSource>,
    next_id: u64,
    /// Bumped on `cancel_all` so completions from a cancelled run are
    /// ignored.
    generation: u64,
    idle_tx: watch::Sender<bool>,
}

/// Owns the speaker device; schedules model audio gaplessly.
///
/// Cloneable handle: all state lives behind an `Arc`.
#[derive(Clone)]
pub struct PlaybackScheduler {
    inner: Arc<Mutex<Inner>>,
    idle_rx: watch::Receiver<bool>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn SpeakerSink>) -> Self {
        let (idle_tx, idle_rx) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sink,
                next_start: 0.0,
                active: HashMap::new(),
                next_id: 0,
                generation: 0,
                idle_tx,
            })),
            idle_rx,
        }
    }

    /// Schedule a chunk back-to-back with whatever is already queued.
    ///
    /// Spawns a completion timer that retires the source and flips the
    /// idle flag once the last source drains.
    pub fn enqueue(&self, chunk: AudioChunk) -> Result<ScheduledSource, DeviceError> {
        let (source, generation, delay) = {
            let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let now = g.sink.now();
            let start = if g.next_start > now { g.next_start } else { now };
            let end = start + chunk.duration_secs();
            g.sink.play_at(&chunk, start)?;

            let id = g.next_id;
            g.next_id += 1;
            let source = ScheduledSource { id, start, end };
            g.active.insert(id, source);
            g.next_start = end;
            let _ = g.idle_tx.send_replace(false);
            (source, g.generation, end - now)
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
            let mut g = inner.lock().unwrap_or_else(|e| e.into_inner());
            if g.generation != generation {
                return;
            }
            g.active.remove(&source.id);
            if g.active.is_empty() {
                debug!("playback drained");
                let _ = g.idle_tx.send_replace(true);
            }
        });

        Ok(source)
    }

    /// Stop every active source immediately and reset the end-time clock.
    /// Used for barge-in and session termination. Idempotent.
    pub fn cancel_all(&self) {
        let mut g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !g.active.is_empty() {
            warn!("cancelling {} active playback source(s)", g.active.len());
        }
        g.generation += 1;
        g.active.clear();
        g.next_start = 0.0;
        g.sink.stop_all();
        let _ = g.idle_tx.send_replace(true);
    }

    /// True iff no source is currently scheduled or playing.
    pub fn is_idle(&self) -> bool {
        let g = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        g.active.is_empty()
    }

    /// Receiver that flips to `true` whenever playback drains.
    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink with a manually driven clock, recording every submission.
    struct FakeSink {
        clock: Arc<Mutex<f64>>,
        played: Arc<Mutex<Vec<(f64, f64)>>>,
        stops: Arc<Mutex<usize>>,
    }

    fn fake_sink() -> (
        FakeSink,
        Arc<Mutex<f64>>,
        Arc<Mutex<Vec<(f64, f64)>>>,
        Arc<Mutex<usize>>,
    ) {
        let clock = Arc::new(Mutex::new(0.0));
        let played = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(Mutex::new(0));
        (
            FakeSink {
                clock: clock.clone(),
                played: played.clone(),
                stops: stops.clone(),
            },
            clock,
            played,
            stops,
        )
    }

    impl SpeakerSink for FakeSink {
        fn now(&self) -> f64 {
            *self.clock.lock().unwrap()
        }

        fn play_at(&mut self, chunk: &AudioChunk, start: f64) -> Result<(), DeviceError> {
            self.played.lock().unwrap().push((start, chunk.duration_secs()));
            Ok(())
        }

        fn stop_all(&mut self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    fn chunk_secs(secs: f64) -> AudioChunk {
        AudioChunk {
            samples: vec![0.0; (secs * 24_000.0) as usize],
            sample_rate: 24_000,
            channels: 1,
        }
    }

    #[tokio::test]
    async fn chunks_schedule_back_to_back() {
        let (sink, _clock, played, _) = fake_sink();
        let sched = PlaybackScheduler::new(Box::new(sink));
        let a = sched.enqueue(chunk_secs(0.5)).unwrap();
        let b = sched.enqueue(chunk_secs(0.25)).unwrap();
        let c = sched.enqueue(chunk_secs(1.0)).unwrap();
        assert_eq!(a.end, b.start);
        assert_eq!(b.end, c.start);
        let starts: Vec<f64> = played.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn late_chunk_starts_at_device_now() {
        let (sink, clock, _, _) = fake_sink();
        let sched = PlaybackScheduler::new(Box::new(sink));
        let a = sched.enqueue(chunk_secs(0.5)).unwrap();
        // Device clock has run well past the previous end.
        *clock.lock().unwrap() = 3.0;
        let b = sched.enqueue(chunk_secs(0.5)).unwrap();
        assert!(a.end < b.start);
        assert_eq!(b.start, 3.0);
    }

    #[tokio::test]
    async fn cancel_all_empties_set_and_resets_clock() {
        let (sink, _, _, stops) = fake_sink();
        let sched = PlaybackScheduler::new(Box::new(sink));
        sched.enqueue(chunk_secs(5.0)).unwrap();
        sched.enqueue(chunk_secs(5.0)).unwrap();
        assert!(!sched.is_idle());
        sched.cancel_all();
        assert!(sched.is_idle());
        assert_eq!(*stops.lock().unwrap(), 1);
        // Next enqueue starts from the device clock, not the stale end time.
        let s = sched.enqueue(chunk_secs(1.0)).unwrap();
        assert_eq!(s.start, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_notification_fires_when_drained() {
        let sched = PlaybackScheduler::new(Box::new(NullSink::new()));
        let mut idle = sched.subscribe_idle();
        sched.enqueue(chunk_secs(0.5)).unwrap();
        assert!(!*idle.borrow_and_update());
        tokio::time::sleep(Duration::from_millis(600)).await;
        idle.changed().await.unwrap();
        assert!(*idle.borrow_and_update());
        assert!(sched.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_after_cancel_is_ignored() {
        let sched = PlaybackScheduler::new(Box::new(NullSink::new()));
        sched.enqueue(chunk_secs(0.5)).unwrap();
        sched.cancel_all();
        let s = sched.enqueue(chunk_secs(10.0)).unwrap();
        // Let the first (cancelled) chunk's timer fire.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!sched.is_idle(), "cancelled timer must not retire {s:?}");
    }
}
