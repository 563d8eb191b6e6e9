//! Interrupt capture with graceful degradation to force-quit.
//!
//! [`InterruptController`] is a small state machine,
//! `armed -> interrupted-once -> force-quit`. The first signal requests a
//! checkpoint. A second signal escalates to force-quit, except that exactly one
//! extra signal arriving within the debounce window of the first is coalesced
//! (Ctrl+C and Escape pressed together, or a terminal delivering SIGINT twice).
//! Clones share one state, so the controller injected into the reporter and
//! the one driving the listener agree.
//!
//! [`InterruptListener`] classifies OS signals and Escape keypresses as they
//! arrive. Checkpoint requests go over a channel to the consumer, so the task
//! registry is only ever touched from its thread of control. Force-quit is
//! handled on the spot, even while the consumer is blocked writing a checkpoint.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Exit status used when a repeated interrupt forces termination.
pub const FORCE_QUIT_EXIT_CODE: i32 = 130;

/// Default window in which a duplicate signal is coalesced into the first.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long the Escape watcher blocks per poll before checking for shutdown.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    Armed,
    InterruptedOnce,
    ForceQuit,
}

/// Where an interrupt came from. Both sources drive the same transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    CtrlC,
    Escape,
}

impl std::fmt::Display for InterruptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptSource::CtrlC => write!(f, "Ctrl+C"),
            InterruptSource::Escape => write!(f, "Escape"),
        }
    }
}

/// What the owner must do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Mark the current task interrupted and emit a checkpoint
    Checkpoint,
    /// Duplicate of the signal that triggered the checkpoint; nothing to do
    Coalesced,
    /// Terminate immediately with [`FORCE_QUIT_EXIT_CODE`]
    ForceQuit,
}

#[derive(Debug)]
struct SignalState {
    state: InterruptState,
    first_signal_at: Option<Instant>,
    coalesced: bool,
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    debounce: Duration,
    inner: Arc<Mutex<SignalState>>,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl InterruptController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            inner: Arc::new(Mutex::new(SignalState {
                state: InterruptState::Armed,
                first_signal_at: None,
                coalesced: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignalState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> InterruptState {
        self.lock().state
    }

    /// Whether a checkpoint has been requested during this run.
    pub fn is_interrupted(&self) -> bool {
        self.state() != InterruptState::Armed
    }

    pub fn signal(&self, source: InterruptSource) -> InterruptAction {
        self.signal_at(source, Instant::now())
    }

    pub fn signal_at(&self, source: InterruptSource, now: Instant) -> InterruptAction {
        let mut inner = self.lock();
        let action = match inner.state {
            InterruptState::Armed => {
                inner.state = InterruptState::InterruptedOnce;
                inner.first_signal_at = Some(now);
                InterruptAction::Checkpoint
            }
            InterruptState::InterruptedOnce => {
                let within_window = inner
                    .first_signal_at
                    .is_some_and(|first| now.saturating_duration_since(first) <= self.debounce);
                if within_window && !inner.coalesced {
                    inner.coalesced = true;
                    InterruptAction::Coalesced
                } else {
                    inner.state = InterruptState::ForceQuit;
                    InterruptAction::ForceQuit
                }
            }
            InterruptState::ForceQuit => InterruptAction::ForceQuit,
        };
        tracing::debug!(%source, state = ?inner.state, ?action, "interrupt signal");
        action
    }
}

/// Leave raw mode if the Escape watcher put the terminal in it.
///
/// Safe to call at any time; a no-op when raw mode was never enabled.
pub fn restore_terminal() {
    if let Err(err) = terminal::disable_raw_mode() {
        tracing::warn!(error = %err, "failed to restore terminal mode");
    }
}

type ForceQuitHook = Box<dyn Fn() + Send + Sync>;

/// Routes each raw signal through the controller.
struct Dispatcher {
    controller: InterruptController,
    tx: mpsc::UnboundedSender<InterruptSource>,
    on_force_quit: ForceQuitHook,
}

impl Dispatcher {
    /// Returns false once the consumer is gone.
    fn dispatch(&self, source: InterruptSource) -> bool {
        match self.controller.signal(source) {
            InterruptAction::Checkpoint => self.tx.send(source).is_ok(),
            InterruptAction::Coalesced => true,
            InterruptAction::ForceQuit => {
                tracing::error!(%source, "repeated interrupt, forcing termination");
                restore_terminal();
                (self.on_force_quit)();
                true
            }
        }
    }
}

/// Background forwarders for interrupt sources. Stopped on drop.
pub struct InterruptListener {
    ctrl_c: JoinHandle<()>,
    escape: Option<EscapeWatcher>,
}

impl InterruptListener {
    /// Start listening for Ctrl+C, and for Escape keypresses when
    /// `listen_escape` is set and both stdin and stdout are terminals.
    ///
    /// Signals that `controller` classifies as checkpoints are sent on `tx`.
    /// A force-quit runs `on_force_quit` right away on the listener's thread,
    /// after leaving raw mode. Must be called from within a tokio runtime.
    pub fn spawn(
        controller: InterruptController,
        tx: mpsc::UnboundedSender<InterruptSource>,
        listen_escape: bool,
        on_force_quit: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            controller,
            tx,
            on_force_quit: Box::new(on_force_quit),
        });

        let ctrl_c_dispatcher = dispatcher.clone();
        let ctrl_c = tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "failed to listen for Ctrl+C");
                    break;
                }
                if !ctrl_c_dispatcher.dispatch(InterruptSource::CtrlC) {
                    break;
                }
            }
        });

        let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let escape = (listen_escape && interactive)
            .then(|| EscapeWatcher::start(dispatcher))
            .flatten();

        Self { ctrl_c, escape }
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        self.ctrl_c.abort();
        if let Some(escape) = self.escape.take() {
            escape.stop();
        }
    }
}

/// Polls the terminal for Escape (and Ctrl+C, which raw mode delivers as a key).
struct EscapeWatcher {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl EscapeWatcher {
    fn start(dispatcher: Arc<Dispatcher>) -> Option<Self> {
        if let Err(err) = terminal::enable_raw_mode() {
            tracing::warn!(error = %err, "failed to enter raw mode, Escape disabled");
            return None;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let spawned = thread::Builder::new()
            .name("docgen-escape".to_string())
            .spawn(move || watch_keys(&dispatcher, &flag));
        match spawned {
            Ok(handle) => Some(Self { stop, handle }),
            Err(err) => {
                restore_terminal();
                tracing::warn!(error = %err, "failed to start Escape key listener");
                None
            }
        }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            tracing::warn!("Escape key listener panicked");
        }
        restore_terminal();
    }
}

fn watch_keys(dispatcher: &Dispatcher, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match event::poll(KEY_POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                tracing::debug!(error = %err, "stopping Escape key listener");
                return;
            }
        }
        let source = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Esc => InterruptSource::Escape,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    InterruptSource::CtrlC
                }
                _ => continue,
            },
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(error = %err, "stopping Escape key listener");
                return;
            }
        };
        if !dispatcher.dispatch(source) {
            return;
        }
    }
}
