use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::multitouch::{DisplaySize, TouchEvent, TouchTick};
use crate::normalizer::EventNormalizer;
use crate::protocol;
use crate::reaper::{IdleReaper, Sweep};
use crate::transcript::Transcript;
use crate::transport::{DisconnectPolicy, Transport};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub type Output = Transcript<Box<dyn Write + Send>>;

struct RelayState {
    normalizer: EventNormalizer,
    reaper: IdleReaper,
    last_tick_ms: Option<u64>,
    output: Option<Output>,
}

/// Process-wide context shared by the input worker, the reaper thread and the
/// console loop.
///
/// The state lock is held for the whole of event dispatch, so tick and reaper
/// events reach the server in the order they were produced. The transport has
/// its own lock so the console can reconnect without touching the state.
pub struct Relay {
    state: Mutex<RelayState>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    running: AtomicBool,
    clock: Arc<dyn Clock>,
    transcript: bool,
    raw: bool,
    policy: DisconnectPolicy,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Relay {
    /// `output` receives the transcript in test mode and raw reports in raw
    /// mode; it is ignored otherwise.
    pub fn new(
        config: &RelayConfig,
        display: DisplaySize,
        clock: Arc<dyn Clock>,
        output: Option<Box<dyn Write + Send>>,
    ) -> Self {
        let wants_output = config.transcript || config.raw;
        Self {
            state: Mutex::new(RelayState {
                normalizer: EventNormalizer::new(display),
                reaper: IdleReaper::new(config.idle_timeout_ms),
                last_tick_ms: None,
                output: output.filter(|_| wants_output).map(Transcript::new),
            }),
            transport: Mutex::new(None),
            running: AtomicBool::new(true),
            clock,
            transcript: config.transcript,
            raw: config.raw,
            policy: config.disconnect_policy,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.transport).is_some()
    }

    pub fn attach(&self, transport: Box<dyn Transport>) {
        *lock(&self.transport) = Some(transport);
    }

    pub fn detach(&self) {
        *lock(&self.transport) = None;
    }

    pub fn display(&self) -> DisplaySize {
        lock(&self.state).normalizer.display()
    }

    /// Write the transcript header, if a transcript is being kept.
    pub fn write_header(&self) {
        if !self.transcript {
            return;
        }
        let mut state = lock(&self.state);
        let display = state.normalizer.display();
        if let Some(out) = state.output.as_mut() {
            if let Err(e) = out.header(display) {
                warn!(error = %e, "failed to write transcript header");
            }
        }
    }

    /// Note something in the transcript, if a transcript is being kept.
    pub fn note(&self, text: &str) {
        if !self.transcript {
            return;
        }
        if let Some(out) = lock(&self.state).output.as_mut() {
            if let Err(e) = out.comment(text) {
                warn!(error = %e, "failed to write transcript");
            }
        }
    }

    /// Normalize one hardware tick and deliver its events. Returns the number
    /// of events produced.
    pub fn handle_tick(&self, tick: &TouchTick) -> usize {
        let now = tick.time_ms.unwrap_or_else(|| self.clock.now_ms());
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.last_tick_ms = Some(now);

        if self.raw {
            if let Some(out) = state.output.as_mut() {
                for report in &tick.reports {
                    if let Err(e) = out.raw(now, report) {
                        warn!(error = %e, "failed to write raw report");
                    }
                }
            }
            return 0;
        }

        let events = state.normalizer.process_tick(tick, now);
        let count = events.len();
        self.dispatch(state, events);
        count
    }

    /// Run one idle sweep and return how long to sleep before the next.
    pub fn sweep_idle(&self) -> Duration {
        let now = self.clock.now_ms();
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let sweep = state
            .reaper
            .sweep(&mut state.normalizer, state.last_tick_ms, now);
        let interval = state.reaper.interval_after(&sweep);
        if let Sweep::Quiet(events) = sweep {
            self.dispatch(state, events);
        }
        interval
    }

    /// Deliver a tick from a recording. Points the recorded gap before it
    /// would have reaped are killed first, at the time the reaper would
    /// have fired.
    pub fn handle_recorded_tick(&self, tick: &TouchTick) -> usize {
        if let Some(time_ms) = tick.time_ms {
            self.sweep_recorded_gap(Some(time_ms));
        }
        self.handle_tick(tick)
    }

    /// Reap whatever is still alive once a recording has ended.
    pub fn finish_recording(&self) {
        self.sweep_recorded_gap(None);
    }

    /// Replays the reaper's two sweeps after the last tick: one that notices
    /// the tick, one just past the idle wait. With `until`, only when the
    /// next tick comes after that second sweep.
    fn sweep_recorded_gap(&self, until: Option<u64>) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let Some(last) = state.last_tick_ms else {
            return;
        };
        let deadline = last + state.reaper.wait().as_millis() as u64 + 1;
        if until.is_some_and(|next| next < deadline) {
            return;
        }
        for now in [last, deadline] {
            let sweep = state
                .reaper
                .sweep(&mut state.normalizer, state.last_tick_ms, now);
            if let Sweep::Quiet(events) = sweep {
                self.dispatch(state, events);
            }
        }
    }

    pub fn idle_wait(&self) -> Duration {
        lock(&self.state).reaper.wait()
    }

    fn dispatch(&self, state: &mut RelayState, events: Vec<TouchEvent>) {
        for event in events {
            debug!(
                slot = event.slot,
                id = event.id,
                kind = ?event.kind,
                x = event.x,
                y = event.y,
                time_ms = event.time_ms,
                "event"
            );
            if self.transcript {
                if let Some(out) = state.output.as_mut() {
                    if let Err(e) = out.event(&event) {
                        warn!(error = %e, "failed to write transcript");
                    }
                }
            }
            self.deliver(&protocol::encode(&event));
        }
    }

    fn deliver(&self, record: &protocol::Record) {
        let mut transport = lock(&self.transport);
        let Some(sink) = transport.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(record) {
            warn!(error = %e, "gesture server connection lost");
            *transport = None;
            if self.policy == DisconnectPolicy::Exit {
                self.stop();
            }
        }
    }
}

/// Spawn the idle reaper loop. It sleeps one wait period before the first
/// sweep and exits once the relay stops.
pub fn spawn_reaper(relay: Arc<Relay>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(relay.idle_wait());
        while relay.is_running() {
            let interval = relay.sweep_idle();
            thread::sleep(interval);
        }
    })
}
