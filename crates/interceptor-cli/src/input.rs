use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use interceptor::{Command, ControllerEvent, StopSignal};
use tracing::{debug, warn};

/// Spawn a thread that turns key presses into controller commands.
///
/// - `s`: start race for the next player
/// - `k`: skip the next player
/// - `e`: end the current session
/// - `q`, Esc or Ctrl+C: quit
///
/// The thread exits after sending `Quit` or once `shutdown` is triggered.
pub fn spawn_keyboard_monitor(
    commands: SyncSender<ControllerEvent>,
    shutdown: Arc<StopSignal>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !shutdown.is_triggered() {
            // Poll with a timeout so the shutdown flag is rechecked
            if event::poll(Duration::from_millis(100)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = event::read()
                && let Some(command) = command_for(&key_event)
            {
                debug!("Key {:?} -> {}", key_event.code, command);
                match commands.try_send(command.into()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => warn!("Busy, ignoring {}", command),
                    Err(TrySendError::Disconnected(_)) => break,
                }
                if command == Command::Quit {
                    break;
                }
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

/// Map a key event to a command. Only presses count.
fn command_for(event: &KeyEvent) -> Option<Command> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    match event.code {
        KeyCode::Char('s') | KeyCode::Char('S') => Some(Command::StartRace),
        KeyCode::Char('k') | KeyCode::Char('K') => Some(Command::SkipPlayer),
        KeyCode::Char('e') | KeyCode::Char('E') => Some(Command::EndSession),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Command::Quit)
        }
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(Command::Quit),
        _ => None,
    }
}
