//! Session orchestration.
//!
//! [`SessionController`] drives one live conversation at a time: it owns
//! the state machine, pumps capture frames to the stream, routes inbound
//! events to playback and the transcript, dispatches tool calls, and
//! tears everything down through a single path on stop or failure. All
//! observable state is published as a [`SessionSnapshot`] over a watch
//! channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{decode_chunk, encode_frame, AudioCapture, PlaybackScheduler};
use crate::config::Config;
use crate::errors::ConnectError;
use crate::live::client::{LiveConfig, LiveTransport, StreamHandle};
use crate::live::protocol::{ServerEvent, StreamEvent};
use crate::live::state::{SessionSnapshot, SessionState};
use crate::tools::{default_declarations, ToolCallResponse, ToolDispatcher};
use crate::transcript::TranscriptAggregator;

/// How long the Ended state lingers before decaying to Idle.
const ENDED_DECAY: Duration = Duration::from_secs(5);
/// Fallback re-check interval while waiting for playback to drain.
const DRAIN_RECHECK: Duration = Duration::from_millis(100);

enum Command {
    Stop,
    Interrupt,
    ClearHistory,
}

struct RunningSession {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Orchestrates live sessions. One at a time; `start` while active is a
/// no-op.
pub struct SessionController {
    config: Config,
    transport: Arc<dyn LiveTransport>,
    dispatcher: ToolDispatcher,
    playback: PlaybackScheduler,
    capture: Arc<Mutex<AudioCapture>>,
    muted: Arc<AtomicBool>,
    /// Bumped on every interruption; in-flight tool results stamped with an
    /// older value are dropped.
    epoch: Arc<AtomicU64>,
    /// Bumped on every start so stale Ended-decay timers cannot touch a
    /// newer session.
    run_id: Arc<AtomicU64>,
    /// True while a session holds a live playback path.
    alive_tx: Arc<watch::Sender<bool>>,
    snapshot_tx: Arc<watch::Sender<SessionSnapshot>>,
    /// Writer handle of the current stream, for out-of-band announcements.
    stream: Arc<Mutex<Option<StreamHandle>>>,
    session: Arc<Mutex<Option<RunningSession>>>,
}

impl SessionController {
    /// `alive_tx` is the playback-liveness flag shared with the reminder
    /// scheduler; the controller flips it as sessions come and go.
    pub fn new(
        config: Config,
        transport: Arc<dyn LiveTransport>,
        dispatcher: ToolDispatcher,
        playback: PlaybackScheduler,
        capture: AudioCapture,
        alive_tx: watch::Sender<bool>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            config,
            transport,
            dispatcher,
            playback,
            capture: Arc::new(Mutex::new(capture)),
            muted: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(AtomicU64::new(0)),
            run_id: Arc::new(AtomicU64::new(0)),
            alive_tx: Arc::new(alive_tx),
            snapshot_tx: Arc::new(snapshot_tx),
            stream: Arc::new(Mutex::new(None)),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Observable session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Flips to `true` while a session has live playback. Reminder
    /// announcements are gated on this.
    pub fn playback_alive(&self) -> watch::Receiver<bool> {
        self.alive_tx.subscribe()
    }

    /// Speak `text` through the current session, if any.
    pub fn announce(&self, text: &str) {
        let guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(handle) if !handle.is_closed() => {
                handle.send_text(&format!(
                    "System: please remind the user now, in your own words: {text}"
                ));
            }
            _ => debug!("announce with no live session; dropped"),
        }
    }

    /// Toggle the microphone mute gate. Returns the new muted value.
    /// Frames captured while muted are dropped, never queued.
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.muted.load(Ordering::SeqCst);
        self.muted.store(muted, Ordering::SeqCst);
        self.snapshot_tx.send_modify(|s| s.muted = muted);
        info!("microphone {}", if muted { "muted" } else { "unmuted" });
        muted
    }

    /// Barge in: silence playback, abandon the model's partial turn, and
    /// invalidate in-flight tool results.
    pub fn interrupt(&self) {
        let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = guard.as_ref() {
            let _ = session.commands.send(Command::Interrupt);
        }
    }

    /// Drop all committed turns and the live accumulators. Routed through
    /// the session loop while active so the aggregator is reset too.
    pub fn clear_history(&self) {
        let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = guard.as_ref() {
            let _ = session.commands.send(Command::ClearHistory);
            return;
        }
        self.snapshot_tx.send_modify(|s| {
            s.history.clear();
            s.user_transcript.clear();
            s.model_transcript.clear();
        });
    }

    /// Start a session: probe connectivity, acquire the microphone, open
    /// the stream, and hand control to the session loop. All observable
    /// progress and failure goes through the snapshot.
    pub async fn start(&self) {
        {
            let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_some() {
                warn!("start ignored: session already active");
                return;
            }
        }
        let run = self.run_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.muted.store(false, Ordering::SeqCst);
        self.snapshot_tx.send_modify(|s| {
            s.state = SessionState::Activating;
            s.error = None;
            s.user_transcript.clear();
            s.model_transcript.clear();
            s.history.clear();
            s.muted = false;
            s.started_at = Some(Utc::now());
        });

        // Fail fast before touching any device.
        if !self.transport.is_online().await {
            self.fail(ConnectError::Offline.user_message());
            return;
        }

        let (frames, mic_rate) = {
            let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
            match capture.open() {
                Ok(rx) => (rx, capture.sample_rate()),
                Err(e) => {
                    self.fail(e.user_message());
                    return;
                }
            }
        };

        let declarations = if self.config.tools.enabled {
            default_declarations()
        } else {
            Vec::new()
        };
        let live_config = LiveConfig::from_config(&self.config, declarations);
        let stream = match self.transport.connect(&live_config).await {
            Ok(s) => s,
            Err(e) => {
                self.capture
                    .lock()
                    .unwrap_or_else(|g| g.into_inner())
                    .close();
                self.fail(e.user_message());
                return;
            }
        };

        info!("session {run} started");
        self.snapshot_tx
            .send_modify(|s| s.state = SessionState::Listening);
        let _ = self.alive_tx.send_replace(true);
        *self.stream.lock().unwrap_or_else(|e| e.into_inner()) = Some(stream.handle.clone());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let loop_ctx = SessionLoop {
            handle: stream.handle.clone(),
            playback: self.playback.clone(),
            dispatcher: self.dispatcher.clone(),
            capture: self.capture.clone(),
            muted: self.muted.clone(),
            epoch: self.epoch.clone(),
            run_id: self.run_id.clone(),
            alive_tx: self.alive_tx.clone(),
            snapshot_tx: self.snapshot_tx.clone(),
            stream_slot: self.stream.clone(),
            session_slot: self.session.clone(),
            mic_rate,
        };
        let task = tokio::spawn(loop_ctx.run(run, stream.events, frames, commands_rx));
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(RunningSession {
            commands: commands_tx,
            task,
        });
    }

    /// End the session and wait for teardown. Idempotent.
    pub async fn stop(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = session {
            let _ = session.commands.send(Command::Stop);
            let _ = session.task.await;
        }
    }

    /// Failure before the session loop exists: release and report.
    fn fail(&self, message: String) {
        warn!("session failed to start: {message}");
        self.snapshot_tx.send_modify(|s| {
            s.state = SessionState::Error;
            s.error = Some(message);
            s.started_at = None;
        });
    }
}

/// Everything the per-session event loop needs, detached from the
/// controller so the loop can own it.
struct SessionLoop {
    handle: StreamHandle,
    playback: PlaybackScheduler,
    dispatcher: ToolDispatcher,
    capture: Arc<Mutex<AudioCapture>>,
    muted: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
    run_id: Arc<AtomicU64>,
    alive_tx: Arc<watch::Sender<bool>>,
    snapshot_tx: Arc<watch::Sender<SessionSnapshot>>,
    stream_slot: Arc<Mutex<Option<StreamHandle>>>,
    session_slot: Arc<Mutex<Option<RunningSession>>>,
    mic_rate: u32,
}

enum Outcome {
    Ended,
    Failed(String),
}

impl SessionLoop {
    async fn run(
        self,
        run: u64,
        mut events: mpsc::UnboundedReceiver<StreamEvent>,
        mut frames: mpsc::Receiver<Vec<f32>>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let started = tokio::time::Instant::now();
        let mut aggregator = TranscriptAggregator::new();
        let mut idle = self.playback.subscribe_idle();
        // A turn boundary arrived but audio is still draining.
        let mut pending_commit = false;
        // Set by barge-in; stale audio from the abandoned turn is dropped
        // until the next turn boundary.
        let mut suppress_audio = false;
        let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<(u64, ToolCallResponse)>();

        let outcome = loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Some(samples) => {
                            if !self.muted.load(Ordering::SeqCst) {
                                self.handle.send_audio_frame(encode_frame(&samples, self.mic_rate));
                            }
                        }
                        None => {
                            break Outcome::Failed(
                                "The microphone stopped delivering audio. Please try again."
                                    .to_string(),
                            );
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(StreamEvent::Ready) => debug!("stream setup complete"),
                        Some(StreamEvent::Event(ev)) => {
                            if let Err(message) = self.apply(
                                ev,
                                &mut aggregator,
                                &mut pending_commit,
                                &mut suppress_audio,
                                &tool_tx,
                            ) {
                                break Outcome::Failed(message);
                            }
                        }
                        Some(StreamEvent::Error(e)) => break Outcome::Failed(e.user_message()),
                        Some(StreamEvent::Closed) | None => break Outcome::Ended,
                    }
                }
                Some(command) = commands.recv() => {
                    match command {
                        Command::Stop => break Outcome::Ended,
                        Command::Interrupt => {
                            self.barge_in(
                                &mut aggregator,
                                &mut pending_commit,
                                &mut suppress_audio,
                            );
                        }
                        Command::ClearHistory => {
                            aggregator.reset();
                            self.snapshot_tx.send_modify(|s| {
                                s.history.clear();
                                s.user_transcript.clear();
                                s.model_transcript.clear();
                            });
                        }
                    }
                }
                Some((epoch, response)) = tool_rx.recv() => {
                    if epoch != self.epoch.load(Ordering::SeqCst) {
                        debug!("dropping tool result from interrupted turn");
                        continue;
                    }
                    self.handle.send_tool_result(response);
                    // Back to listening unless audio already started.
                    self.snapshot_tx.send_modify(|s| {
                        if s.state == SessionState::Processing {
                            s.state = SessionState::Listening;
                        }
                    });
                }
                _ = idle.changed(), if pending_commit => {
                    if *idle.borrow_and_update() {
                        pending_commit = false;
                        self.commit(&mut aggregator);
                    }
                }
                _ = tokio::time::sleep(DRAIN_RECHECK), if pending_commit => {
                    // Watch updates can race a same-instant enqueue; re-check.
                    if self.playback.is_idle() {
                        pending_commit = false;
                        self.commit(&mut aggregator);
                    }
                }
            }
        };

        // Single teardown path for both endings.
        self.handle.close();
        *self
            .stream_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        // Release the slot so the next start is not refused. Dropping our
        // own join handle merely detaches it.
        *self
            .session_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        self.capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .close();
        self.playback.cancel_all();
        let _ = self.alive_tx.send_replace(false);

        match outcome {
            Outcome::Ended => {
                // The unfinished turn is discarded, not committed.
                aggregator.reset();
                let elapsed = started.elapsed().as_secs();
                info!("session {run} ended after {elapsed}s");
                self.snapshot_tx.send_modify(|s| {
                    s.user_transcript.clear();
                    s.model_transcript.clear();
                    s.state = SessionState::Ended;
                    s.started_at = None;
                    s.last_session_secs = Some(elapsed);
                });
                self.spawn_ended_decay(run);
            }
            Outcome::Failed(message) => {
                warn!("session {run} failed: {message}");
                self.snapshot_tx.send_modify(|s| {
                    s.state = SessionState::Error;
                    s.error = Some(message);
                    s.started_at = None;
                });
            }
        }
    }

    /// Route one inbound server event. Returns a user message on fatal
    /// device failure.
    fn apply(
        &self,
        event: ServerEvent,
        aggregator: &mut TranscriptAggregator,
        pending_commit: &mut bool,
        suppress_audio: &mut bool,
        tool_tx: &mpsc::UnboundedSender<(u64, ToolCallResponse)>,
    ) -> Result<(), String> {
        if event.interrupted {
            // The server marker only silences what is audible; the partial
            // transcript stays and any pending tool result is still sent.
            debug!("server interruption marker: stopping playback");
            self.playback.cancel_all();
        }

        if let Some(fragment) = &event.user_fragment {
            aggregator.append_user(fragment);
        }
        if let Some(fragment) = &event.model_fragment {
            aggregator.append_model(fragment);
        }
        if event.user_fragment.is_some() || event.model_fragment.is_some() {
            let user = aggregator.user_text().to_string();
            let model = aggregator.model_text().to_string();
            self.snapshot_tx.send_modify(|s| {
                s.user_transcript = user;
                s.model_transcript = model;
            });
        }

        if !event.tool_calls.is_empty() {
            self.snapshot_tx
                .send_modify(|s| s.state = SessionState::Processing);
            let epoch = self.epoch.load(Ordering::SeqCst);
            let dispatcher = self.dispatcher.clone();
            let batch = event.tool_calls.clone();
            let tool_tx = tool_tx.clone();
            tokio::spawn(async move {
                if let Some(response) = dispatcher.dispatch(&batch).await {
                    let _ = tool_tx.send((epoch, response));
                }
            });
        }

        if !event.audio.is_empty() {
            if *suppress_audio {
                debug!("dropping {} audio payload(s) from interrupted turn", event.audio.len());
            } else {
                for payload in &event.audio {
                    match decode_chunk(payload, 24_000) {
                        Some(chunk) => {
                            if let Err(e) = self.playback.enqueue(chunk) {
                                return Err(e.user_message());
                            }
                        }
                        None => warn!("dropping undecodable audio payload"),
                    }
                }
                self.snapshot_tx
                    .send_modify(|s| s.state = SessionState::Speaking);
            }
        }

        if event.turn_complete {
            *suppress_audio = false;
            if self.playback.is_idle() {
                self.commit(aggregator);
            } else {
                // Hold the boundary until the audio tail drains.
                *pending_commit = true;
            }
        }

        Ok(())
    }

    /// User-initiated interruption: silence playback, abandon the model's
    /// partial turn, invalidate in-flight tool results, and drop any audio
    /// still arriving for the abandoned turn.
    fn barge_in(
        &self,
        aggregator: &mut TranscriptAggregator,
        pending_commit: &mut bool,
        suppress_audio: &mut bool,
    ) {
        info!("barge-in: cancelling model turn");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.playback.cancel_all();
        aggregator.reset_model();
        *pending_commit = false;
        *suppress_audio = true;
        let user = aggregator.user_text().to_string();
        self.snapshot_tx.send_modify(|s| {
            s.model_transcript.clear();
            s.user_transcript = user;
            s.state = SessionState::Listening;
        });
    }

    fn commit(&self, aggregator: &mut TranscriptAggregator) {
        let turn = aggregator.commit_turn();
        self.snapshot_tx.send_modify(|s| {
            if let Some(turn) = turn {
                s.history.push(turn);
            }
            s.user_transcript.clear();
            s.model_transcript.clear();
            s.state = SessionState::Listening;
        });
    }

    fn spawn_ended_decay(&self, run: u64) {
        let run_id = self.run_id.clone();
        let snapshot_tx = self.snapshot_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ENDED_DECAY).await;
            if run_id.load(Ordering::SeqCst) != run {
                return;
            }
            snapshot_tx.send_modify(|s| {
                if s.state == SessionState::Ended {
                    s.state = SessionState::Idle;
                }
            });
        });
    }
}
