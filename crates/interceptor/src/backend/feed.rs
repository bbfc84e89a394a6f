use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::Backend;
use super::types::{QueueSnapshot, RigSnapshot};
use crate::error::Result;
use crate::signal::StopSignal;

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Queue server reachability changed
    Connected(bool),
    /// This rig's snapshot changed
    Update(RigSnapshot),
}

/// What the feed has already reported, so only changes are emitted.
#[derive(Debug, Default)]
struct FeedState {
    connected: Option<bool>,
    last: Option<RigSnapshot>,
    missing_warned: bool,
}

impl FeedState {
    fn observe(&mut self, rig_id: u32, result: Result<QueueSnapshot>) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        match result {
            Ok(snapshot) => {
                if self.connected != Some(true) {
                    info!("Connected to queue server");
                    self.connected = Some(true);
                    events.push(FeedEvent::Connected(true));
                }
                match snapshot.rig(rig_id) {
                    Some(rig) => {
                        self.missing_warned = false;
                        if self.last.as_ref() != Some(rig) {
                            debug!(
                                "Rig {} is {}, {} waiting",
                                rig.id,
                                rig.state,
                                rig.queue.len()
                            );
                            self.last = Some(rig.clone());
                            events.push(FeedEvent::Update(rig.clone()));
                        }
                    }
                    None => {
                        if !self.missing_warned {
                            warn!("Rig {} not present in queue snapshot", rig_id);
                            self.missing_warned = true;
                        }
                    }
                }
            }
            Err(e) => {
                if self.connected != Some(false) {
                    warn!("Queue server unreachable: {}", e);
                    self.connected = Some(false);
                    self.last = None;
                    events.push(FeedEvent::Connected(false));
                }
            }
        }
        events
    }

    fn forget(&mut self) {
        self.connected = None;
        self.last = None;
    }
}

/// Background thread polling the queue snapshot for one rig.
pub struct QueueFeed {
    stop: Arc<StopSignal>,
    handle: Option<(JoinHandle<()>, Receiver<()>)>,
}

impl QueueFeed {
    pub fn spawn<E>(
        backend: Arc<dyn Backend>,
        rig_id: u32,
        interval: Duration,
        events: SyncSender<E>,
    ) -> Result<Self>
    where
        E: From<FeedEvent> + Send + 'static,
    {
        let stop = Arc::new(StopSignal::new());
        let thread_stop = Arc::clone(&stop);
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("queue-feed".to_string())
            .spawn(move || {
                poll_loop(backend.as_ref(), rig_id, interval, &events, &thread_stop);
                let _ = done_tx.send(());
            })?;

        debug!("Queue feed polling every {}ms", interval.as_millis());
        Ok(Self {
            stop,
            handle: Some((handle, done_rx)),
        })
    }

    pub fn stop(&mut self) {
        let Some((handle, done)) = self.handle.take() else {
            return;
        };
        self.stop.trigger();
        match done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
            }
            Err(RecvTimeoutError::Timeout) => warn!("Queue feed did not stop in time, detaching"),
        }
    }
}

impl Drop for QueueFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop<E: From<FeedEvent>>(
    backend: &dyn Backend,
    rig_id: u32,
    interval: Duration,
    events: &SyncSender<E>,
    stop: &StopSignal,
) {
    let mut state = FeedState::default();
    while !stop.is_triggered() {
        for event in state.observe(rig_id, backend.fetch_queue()) {
            match events.try_send(event.into()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Event channel full, will resend queue state");
                    state.forget();
                    break;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        if stop.wait(interval) {
            break;
        }
    }
}
