use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::injector::Injector;
use super::session::{FileEvent, Session, SharedState, WatchEvent, WatchState};
use crate::error::{Error, Result};
use crate::signal::StopSignal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub path: PathBuf,
    pub debounce: Duration,
    pub settle: Duration,
    pub stop_timeout: Duration,
}

/// Something that can be armed with a name and stopped again.
pub trait NameWatcher {
    /// Start a new session for `name`, replacing any current one.
    fn arm(&mut self, name: &str) -> Result<u64>;

    /// Stop the current session. Its pending result is discarded.
    fn stop(&mut self);

    fn state(&self) -> WatchState;

    /// Id of the newest session, finished or not.
    fn current_session(&self) -> Option<u64>;
}

struct ActiveSession {
    id: u64,
    name: String,
    stop: Arc<StopSignal>,
    state: SharedState,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Watches the directory holding the target file and injects the armed name
/// on the first qualifying change.
///
/// Results are sent to `events` as `E::from(WatchEvent)`, so the watcher can
/// feed a controller channel directly.
pub struct RaceIniWatcher<E = WatchEvent> {
    settings: WatchSettings,
    injector: Arc<dyn Injector>,
    events: SyncSender<E>,
    next_id: u64,
    active: Option<ActiveSession>,
}

fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl<E> RaceIniWatcher<E> {
    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    pub fn armed_name(&self) -> Option<&str> {
        self.active
            .as_ref()
            .filter(|a| a.state.get() != WatchState::Idle)
            .map(|a| a.name.as_str())
    }

    fn stop_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let was_running = active.state.get() != WatchState::Idle;
        active.stop.trigger();

        match active.done.recv_timeout(self.settings.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if active.handle.join().is_err() {
                    warn!("Watch session {} panicked", active.id);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Watch session {} did not stop within {}ms, detaching",
                    active.id,
                    self.settings.stop_timeout.as_millis()
                );
            }
        }
        if was_running {
            info!("Stopped watching for '{}'", active.name);
        }
    }
}

impl<E: From<WatchEvent> + Send + 'static> RaceIniWatcher<E> {
    pub fn new(
        settings: WatchSettings,
        injector: Arc<dyn Injector>,
        events: SyncSender<E>,
    ) -> Self {
        Self {
            settings,
            injector,
            events,
            next_id: 0,
            active: None,
        }
    }

    /// Arm against the real filesystem.
    pub fn arm(&mut self, name: &str) -> Result<u64> {
        self.stop_active();

        let dir = watch_dir(&self.settings.path);
        fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::channel();
        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths {
                        // Receiver gone means the session already ended.
                        let _ = tx.send(FileEvent::now(path));
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("File watch error: {}", e),
            }
        })?;
        fs_watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let id = self.spawn(name, rx, Some(fs_watcher))?;
        info!("Watching {} for '{}'", self.settings.path.display(), name);
        Ok(id)
    }

    /// Arm without an OS watch; the caller delivers events through the
    /// returned sender.
    pub fn arm_with_feed(&mut self, name: &str) -> Result<(u64, Sender<FileEvent>)> {
        self.stop_active();
        let (tx, rx) = mpsc::channel();
        let id = self.spawn(name, rx, None)?;
        Ok((id, tx))
    }

    fn spawn(
        &mut self,
        name: &str,
        rx: Receiver<FileEvent>,
        fs_watcher: Option<RecommendedWatcher>,
    ) -> Result<u64> {
        let file_name = self
            .settings
            .path
            .file_name()
            .ok_or_else(|| {
                Error::Config(format!("{} is not a file path", self.settings.path.display()))
            })?
            .to_os_string();

        self.next_id += 1;
        let id = self.next_id;
        let stop = Arc::new(StopSignal::new());
        let state = SharedState::default();
        state.set(WatchState::Armed);

        let session = Session {
            id,
            name: name.to_string(),
            file_name,
            debouncer: Debouncer::new(self.settings.debounce),
            settle: self.settings.settle,
            injector: Arc::clone(&self.injector),
            events: self.events.clone(),
            stop: Arc::clone(&stop),
            state: state.clone(),
        };

        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("race-ini-watch-{id}"))
            .spawn(move || {
                session.run(rx);
                drop(fs_watcher);
                let _ = done_tx.send(());
            })?;

        debug!("Started watch session {} for '{}'", id, name);
        self.active = Some(ActiveSession {
            id,
            name: name.to_string(),
            stop,
            state,
            handle,
            done: done_rx,
        });
        Ok(id)
    }
}

impl<E: From<WatchEvent> + Send + 'static> NameWatcher for RaceIniWatcher<E> {
    fn arm(&mut self, name: &str) -> Result<u64> {
        RaceIniWatcher::arm(self, name)
    }

    fn stop(&mut self) {
        self.stop_active();
    }

    fn state(&self) -> WatchState {
        self.active
            .as_ref()
            .map(|a| a.state.get())
            .unwrap_or_default()
    }

    fn current_session(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.id)
    }
}

impl<E> Drop for RaceIniWatcher<E> {
    fn drop(&mut self) {
        self.stop_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::PatchReport;
    use crate::retry::FixedDelay;
    use crate::watch::RaceIniInjector;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;

    /// Records calls; fails the first `failures` of them.
    #[derive(Default)]
    struct FakeInjector {
        names: Mutex<Vec<String>>,
        failures: AtomicU32,
        delay: Duration,
    }

    impl FakeInjector {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.names.lock().unwrap().clone()
        }
    }

    impl Injector for FakeInjector {
        fn inject(&self, name: &str) -> Result<PatchReport> {
            self.names.lock().unwrap().push(name.to_string());
            thread::sleep(self.delay);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::RetriesExhausted {
                    op: "write",
                    path: PathBuf::from("race.ini"),
                    attempts: 5,
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
                });
            }
            Ok(PatchReport::default())
        }
    }

    fn settings(path: PathBuf) -> WatchSettings {
        WatchSettings {
            path,
            debounce: Duration::from_millis(500),
            settle: Duration::from_millis(20),
            stop_timeout: Duration::from_secs(2),
        }
    }

    fn setup(injector: Arc<FakeInjector>) -> (RaceIniWatcher, Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::sync_channel(16);
        let watcher =
            RaceIniWatcher::new(settings(PathBuf::from("cfg/race.ini")), injector, tx);
        (watcher, rx)
    }

    fn event_at(at: Instant) -> FileEvent {
        FileEvent {
            path: PathBuf::from("cfg/race.ini"),
            at,
        }
    }

    const WAIT: Duration = Duration::from_secs(3);

    #[test]
    fn test_three_rapid_events_complete_once() {
        let injector = Arc::new(FakeInjector::default());
        let (mut watcher, rx) = setup(injector.clone());
        let (session, feed) = watcher.arm_with_feed("Bob").unwrap();
        assert_eq!(watcher.state(), WatchState::Armed);

        let t0 = Instant::now();
        for offset in [0, 10, 20] {
            feed.send(event_at(t0 + Duration::from_millis(offset))).unwrap();
        }

        match rx.recv_timeout(WAIT).unwrap() {
            WatchEvent::Injected { session: s, name, .. } => {
                assert_eq!(s, session);
                assert_eq!(name, "Bob");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(injector.calls(), vec!["Bob".to_string()]);
        assert_eq!(watcher.state(), WatchState::Idle);
        assert_eq!(watcher.armed_name(), None);
    }

    #[test]
    fn test_events_100ms_apart_trigger_one_attempt() {
        let injector = Arc::new(FakeInjector::failing(u32::MAX));
        let (mut watcher, rx) = setup(injector.clone());
        let (_, feed) = watcher.arm_with_feed("Alice").unwrap();

        let t0 = Instant::now();
        feed.send(event_at(t0)).unwrap();
        feed.send(event_at(t0 + Duration::from_millis(100))).unwrap();

        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            WatchEvent::InjectionFailed { .. }
        ));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(injector.calls().len(), 1);
    }

    #[test]
    fn test_events_600ms_apart_trigger_two_attempts() {
        let injector = Arc::new(FakeInjector::failing(u32::MAX));
        let (mut watcher, rx) = setup(injector.clone());
        let (_, feed) = watcher.arm_with_feed("Alice").unwrap();

        let t0 = Instant::now();
        feed.send(event_at(t0)).unwrap();
        feed.send(event_at(t0 + Duration::from_millis(600))).unwrap();

        for _ in 0..2 {
            assert!(matches!(
                rx.recv_timeout(WAIT).unwrap(),
                WatchEvent::InjectionFailed { .. }
            ));
        }
        assert_eq!(injector.calls().len(), 2);
        assert_eq!(watcher.state(), WatchState::Armed);
        assert_eq!(watcher.armed_name(), Some("Alice"));
    }

    #[test]
    fn test_failure_keeps_session_armed_until_success() {
        let injector = Arc::new(FakeInjector::failing(1));
        let (mut watcher, rx) = setup(injector.clone());
        let (session, feed) = watcher.arm_with_feed("Carol").unwrap();

        let t0 = Instant::now();
        feed.send(event_at(t0)).unwrap();
        let failed = rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(failed, WatchEvent::InjectionFailed { .. }));
        assert_eq!(failed.session(), session);

        feed.send(event_at(t0 + Duration::from_millis(700))).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            WatchEvent::Injected { .. }
        ));
        assert_eq!(injector.calls().len(), 2);
    }

    #[test]
    fn test_other_files_ignored() {
        let injector = Arc::new(FakeInjector::default());
        let (mut watcher, rx) = setup(injector.clone());
        let (_, feed) = watcher.arm_with_feed("Dave").unwrap();

        feed.send(FileEvent::now("cfg/video.ini")).unwrap();
        feed.send(FileEvent::now("cfg/race.ini.bak")).unwrap();
        feed.send(FileEvent::now("cfg/myrace.ini")).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert!(injector.calls().is_empty());
        assert_eq!(watcher.state(), WatchState::Armed);
    }

    #[test]
    fn test_rearm_replaces_session() {
        let injector = Arc::new(FakeInjector::default());
        let (mut watcher, rx) = setup(injector.clone());
        let (first, old_feed) = watcher.arm_with_feed("Alice").unwrap();
        let (second, feed) = watcher.arm_with_feed("Bob").unwrap();
        assert_ne!(first, second);
        assert_eq!(watcher.current_session(), Some(second));

        // The first session is gone, so its feed is closed.
        assert!(old_feed.send(FileEvent::now("cfg/race.ini")).is_err());
        feed.send(FileEvent::now("cfg/race.ini")).unwrap();

        match rx.recv_timeout(WAIT).unwrap() {
            WatchEvent::Injected { session, name, .. } => {
                assert_eq!(session, second);
                assert_eq!(name, "Bob");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(injector.calls(), vec!["Bob".to_string()]);
    }

    #[test]
    fn test_stop_discards_in_flight_result() {
        let injector = Arc::new(FakeInjector::slow(Duration::from_millis(300)));
        let (mut watcher, rx) = setup(injector.clone());
        let (_, feed) = watcher.arm_with_feed("Eve").unwrap();

        feed.send(FileEvent::now("cfg/race.ini")).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(watcher.state(), WatchState::Injecting);
        watcher.stop();

        assert_eq!(watcher.state(), WatchState::Idle);
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
        assert_eq!(injector.calls().len(), 1);
    }

    #[test]
    fn test_stop_during_settle_skips_injection() {
        let injector = Arc::new(FakeInjector::default());
        let (tx, rx) = mpsc::sync_channel::<WatchEvent>(4);
        let mut watcher = RaceIniWatcher::new(
            WatchSettings {
                settle: Duration::from_secs(5),
                ..settings(PathBuf::from("cfg/race.ini"))
            },
            injector.clone(),
            tx,
        );
        let (_, feed) = watcher.arm_with_feed("Frank").unwrap();
        feed.send(FileEvent::now("cfg/race.ini")).unwrap();
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        watcher.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(rx.try_recv().is_err());
        assert!(injector.calls().is_empty());
    }

    #[test]
    fn test_stop_timeout_detaches_worker() {
        let injector = Arc::new(FakeInjector::slow(Duration::from_millis(600)));
        let (tx, rx) = mpsc::sync_channel::<WatchEvent>(4);
        let mut watcher = RaceIniWatcher::new(
            WatchSettings {
                stop_timeout: Duration::from_millis(50),
                settle: Duration::ZERO,
                ..settings(PathBuf::from("cfg/race.ini"))
            },
            injector.clone(),
            tx,
        );
        let (_, feed) = watcher.arm_with_feed("Gina").unwrap();
        feed.send(FileEvent::now("cfg/race.ini")).unwrap();
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        watcher.stop();
        assert!(start.elapsed() < Duration::from_millis(400));
        assert!(rx.recv_timeout(Duration::from_millis(900)).is_err());
    }

    #[test]
    fn test_arm_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Documents").join("cfg").join("race.ini");
        let (tx, _rx) = mpsc::sync_channel::<WatchEvent>(4);
        let mut watcher =
            RaceIniWatcher::new(settings(path.clone()), Arc::new(FakeInjector::default()), tx);

        watcher.arm("Hank").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert_eq!(watcher.state(), WatchState::Armed);
        watcher.stop();
        assert_eq!(watcher.state(), WatchState::Idle);
    }

    #[test]
    fn test_real_file_change_is_patched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("race.ini");
        fs::write(&path, "[CAR_0]\nDRIVER_NAME=Old\n").unwrap();

        let injector = Arc::new(RaceIniInjector::new(
            &path,
            FixedDelay::new(5, Duration::from_millis(10)),
        ));
        let (tx, rx) = mpsc::sync_channel::<WatchEvent>(4);
        let mut watcher = RaceIniWatcher::new(settings(path.clone()), injector, tx);
        watcher.arm("Ivy").unwrap();

        thread::sleep(Duration::from_millis(100));
        fs::write(
            &path,
            "[CAR_0]\nDRIVER_NAME=Launcher\n[REMOTE]\nNAME=Launcher\n",
        )
        .unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            WatchEvent::Injected { report, .. } => assert_eq!(report.changes.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[CAR_0]\nDRIVER_NAME=Ivy\n[REMOTE]\nNAME=Ivy\n"
        );
    }
}
