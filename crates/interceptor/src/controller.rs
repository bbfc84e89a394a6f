//! Rig session controller.
//!
//! Every input (queue feed, watcher results, operator commands, timer ticks)
//! arrives as a [`ControllerEvent`] on one channel and is handled by a single
//! loop, so session state has exactly one owner.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, FeedEvent, Player, RigSnapshot, RigState};
use crate::error::{Error, Result};
use crate::signal::StopSignal;
use crate::watch::{NameWatcher, WatchEvent, WatchState};

const TICK: Duration = Duration::from_millis(250);

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Command {
    StartRace,
    SkipPlayer,
    EndSession,
    Quit,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Feed(FeedEvent),
    Watch(WatchEvent),
    Command(Command),
    Tick,
}

impl From<FeedEvent> for ControllerEvent {
    fn from(event: FeedEvent) -> Self {
        ControllerEvent::Feed(event)
    }
}

impl From<WatchEvent> for ControllerEvent {
    fn from(event: WatchEvent) -> Self {
        ControllerEvent::Watch(event)
    }
}

impl From<Command> for ControllerEvent {
    fn from(command: Command) -> Self {
        ControllerEvent::Command(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What the operator sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    pub connected: bool,
    pub rig_state: RigState,
    pub current_player: Option<Player>,
    pub next_player: Option<Player>,
    pub queue_len: usize,
    pub watch_state: WatchState,
    /// Name waiting to be injected
    pub hot_player: Option<String>,
    pub racing_since: Option<DateTime<Local>>,
    pub message: String,
    /// Successful injections since startup
    pub races: u32,
}

struct HotPhase {
    name: String,
    deadline: Option<Instant>,
}

pub struct SessionController<W: NameWatcher> {
    backend: Arc<dyn Backend>,
    watcher: W,
    hot_phase_timeout: Option<Duration>,
    rig: Option<RigSnapshot>,
    hot: Option<HotPhase>,
    status: ControllerStatus,
}

impl<W: NameWatcher> SessionController<W> {
    pub fn new(
        backend: Arc<dyn Backend>,
        watcher: W,
        hot_phase_timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            watcher,
            hot_phase_timeout,
            rig: None,
            hot: None,
            status: ControllerStatus {
                message: "Waiting for queue server...".to_string(),
                ..ControllerStatus::default()
            },
        }
    }

    pub fn status(&self) -> &ControllerStatus {
        &self.status
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    /// Drain `events` until `Quit`, a triggered `stop`, or every sender is
    /// gone. `on_status` is called whenever the status changes.
    pub fn run<F>(
        &mut self,
        events: &Receiver<ControllerEvent>,
        stop: &StopSignal,
        mut on_status: F,
    ) where
        F: FnMut(&ControllerStatus),
    {
        on_status(&self.status);
        while !stop.is_triggered() {
            let event = match events.recv_timeout(TICK) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => ControllerEvent::Tick,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let before = self.status.clone();
            let flow = self.handle(event);
            if self.status != before {
                on_status(&self.status);
            }
            if flow == Flow::Quit {
                break;
            }
        }
        self.shutdown();
    }

    pub fn handle(&mut self, event: ControllerEvent) -> Flow {
        let flow = match event {
            ControllerEvent::Command(command) => self.on_command(command),
            ControllerEvent::Feed(event) => {
                self.on_feed(event);
                Flow::Continue
            }
            ControllerEvent::Watch(event) => {
                self.on_watch(event);
                Flow::Continue
            }
            ControllerEvent::Tick => Flow::Continue,
        };
        // a busy channel must not postpone the deadline
        self.check_hot_phase_timeout();
        self.status.watch_state = self.watcher.state();
        flow
    }

    pub fn shutdown(&mut self) {
        self.watcher.stop();
        self.hot = None;
        self.status.hot_player = None;
        self.status.watch_state = self.watcher.state();
    }

    fn set_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.status.message = message;
    }

    fn on_command(&mut self, command: Command) -> Flow {
        debug!("Command: {}", command);
        match command {
            Command::StartRace => {
                if let Err(e) = self.start_race() {
                    warn!("Start race failed: {}", e);
                    self.status.message = format!("Cannot start race: {}", e);
                }
            }
            Command::SkipPlayer => match self.skip_player() {
                Ok(name) => self.set_message(format!("Skipped {}", name)),
                Err(e) => {
                    warn!("Skip failed: {}", e);
                    self.status.message = format!("Cannot skip: {}", e);
                }
            },
            Command::EndSession => self.end_session(),
            Command::Quit => {
                info!("Quit requested");
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn next_player(&self) -> Result<Player> {
        let queued = match &self.rig {
            Some(rig) => rig.next_player().cloned(),
            None => self.backend.next_player()?,
        };
        queued.ok_or(Error::NoPlayer)
    }

    fn start_race(&mut self) -> Result<()> {
        if let Some(hot) = &self.hot {
            return Err(Error::Api(format!("already waiting for {}", hot.name)));
        }
        if self.rig.as_ref().is_some_and(|r| r.state == RigState::Racing) {
            return Err(Error::Api("rig is racing, end the session first".into()));
        }

        let player = self.next_player()?;
        self.backend.start_session(&player.id)?;

        if let Err(e) = self.watcher.arm(&player.name) {
            error!("Failed to watch race.ini: {}", e);
            self.status.message =
                format!("Session started but race.ini cannot be watched: {}", e);
            return Ok(());
        }

        self.hot = Some(HotPhase {
            name: player.name.clone(),
            deadline: self.hot_phase_timeout.map(|t| Instant::now() + t),
        });
        self.status.hot_player = Some(player.name.clone());
        self.status.racing_since = Some(Local::now());
        self.status.rig_state = RigState::Racing;
        self.status.current_player = Some(player.clone());
        if let Some(rig) = &mut self.rig {
            rig.state = RigState::Racing;
        }
        self.set_message(format!("Start the race now. Waiting to inject {}...", player.name));
        Ok(())
    }

    fn skip_player(&mut self) -> Result<String> {
        let player = self.next_player()?;
        self.backend.skip_player()?;
        Ok(player.name)
    }

    fn end_session(&mut self) {
        if self.hot.take().is_some() {
            self.watcher.stop();
            self.status.hot_player = None;
        }
        match self.backend.complete_session() {
            Ok(()) => {
                self.status.racing_since = None;
                self.status.rig_state = RigState::Free;
                self.status.current_player = None;
                if let Some(rig) = &mut self.rig {
                    rig.state = RigState::Free;
                    rig.current_player = None;
                }
                self.set_message("Session complete, rig is free");
            }
            Err(e) => {
                warn!("Complete session failed: {}", e);
                self.status.message = format!("Cannot end session: {}", e);
            }
        }
    }

    fn on_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Connected(true) => {
                self.status.connected = true;
                self.set_message("Connected to queue server");
            }
            FeedEvent::Connected(false) => {
                self.status.connected = false;
                self.set_message("Queue server unreachable, retrying...");
            }
            FeedEvent::Update(rig) => {
                self.status.rig_state = rig.state;
                self.status.current_player = rig.current_player.clone();
                self.status.next_player = rig.next_player().cloned();
                self.status.queue_len = rig.queue.len();
                if rig.state == RigState::Free && self.hot.is_none() {
                    self.status.racing_since = None;
                }
                self.rig = Some(rig);
            }
        }
    }

    fn on_watch(&mut self, event: WatchEvent) {
        if Some(event.session()) != self.watcher.current_session() || self.hot.is_none() {
            debug!("Ignoring result of stale session {}", event.session());
            return;
        }
        match event {
            WatchEvent::Injected { name, report, .. } => {
                self.hot = None;
                self.watcher.stop();
                self.status.hot_player = None;
                self.status.races += 1;
                if report.is_empty() {
                    warn!("race.ini had no name fields for {}", name);
                }
                self.set_message("Name injected! Racing in progress...");
            }
            WatchEvent::InjectionFailed { name, error, .. } => {
                self.status.message = format!(
                    "Could not write {} into race.ini, waiting to retry ({})",
                    name, error
                );
            }
        }
    }

    fn check_hot_phase_timeout(&mut self) {
        let expired = self
            .hot
            .as_ref()
            .and_then(|h| h.deadline)
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !expired {
            return;
        }
        if let Some(hot) = self.hot.take() {
            self.watcher.stop();
            self.status.hot_player = None;
            warn!("Hot phase for {} timed out", hot.name);
            self.status.message = format!(
                "Timed out waiting for race.ini, {} was not injected",
                hot.name
            );
        }
    }
}
