use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::injector::Injector;
use crate::ini::PatchReport;
use crate::signal::StopSignal;

const RECV_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchState {
    #[default]
    Idle,
    Armed,
    Injecting,
}

/// A filesystem change, stamped when it was received.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub at: Instant,
}

impl FileEvent {
    pub fn now<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            at: Instant::now(),
        }
    }
}

/// Outcome of an injection attempt, tagged with the session that made it.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Injected {
        session: u64,
        name: String,
        report: PatchReport,
    },
    InjectionFailed {
        session: u64,
        name: String,
        error: String,
    },
}

impl WatchEvent {
    pub fn session(&self) -> u64 {
        match self {
            WatchEvent::Injected { session, .. } | WatchEvent::InjectionFailed { session, .. } => {
                *session
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState(Arc<Mutex<WatchState>>);

impl SharedState {
    pub(crate) fn get(&self) -> WatchState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: WatchState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// One armed session: consumes file events until an injection succeeds or
/// the stop signal fires.
pub(crate) struct Session<E> {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) file_name: OsString,
    pub(crate) debouncer: Debouncer,
    pub(crate) settle: Duration,
    pub(crate) injector: Arc<dyn Injector>,
    pub(crate) events: SyncSender<E>,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) state: SharedState,
}

impl<E: From<WatchEvent>> Session<E> {
    pub(crate) fn run(mut self, rx: Receiver<FileEvent>) {
        self.state.set(WatchState::Armed);
        debug!("Session {} armed for '{}'", self.id, self.name);

        while !self.stop.is_triggered() {
            match rx.recv_timeout(RECV_POLL) {
                Ok(event) => {
                    if self.handle(event) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Session {} event source closed", self.id);
                    break;
                }
            }
        }

        self.state.set(WatchState::Idle);
        debug!("Session {} finished", self.id);
    }

    /// Returns `true` when the session is over.
    fn handle(&mut self, event: FileEvent) -> bool {
        if event.path.file_name() != Some(self.file_name.as_os_str()) {
            return false;
        }
        if !self.debouncer.accept(event.at) {
            debug!("Ignoring event for {} within debounce window", event.path.display());
            return false;
        }

        info!("{} modified, intercepting...", event.path.display());
        self.state.set(WatchState::Injecting);

        if self.stop.wait(self.settle) {
            return true;
        }
        let result = self.injector.inject(&self.name);
        if self.stop.is_triggered() {
            debug!("Session {} stopped during injection, discarding result", self.id);
            return true;
        }

        match result {
            Ok(report) => {
                info!("Injected '{}'", self.name);
                self.state.set(WatchState::Idle);
                self.notify(WatchEvent::Injected {
                    session: self.id,
                    name: self.name.clone(),
                    report,
                });
                true
            }
            Err(e) => {
                warn!("Injection of '{}' failed, waiting to retry: {}", self.name, e);
                self.state.set(WatchState::Armed);
                self.notify(WatchEvent::InjectionFailed {
                    session: self.id,
                    name: self.name.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Blocks while the channel is full; results are never dropped.
    fn notify(&self, event: WatchEvent) {
        if self.events.send(event.into()).is_err() {
            debug!("Event receiver gone, session {}", self.id);
        }
    }
}
