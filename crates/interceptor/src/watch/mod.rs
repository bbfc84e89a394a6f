//! Debounced watcher that injects a player name into `race.ini`.
//!
//! A session is armed with a name, waits for the launcher to rewrite the
//! file, lets the write settle, then patches the name fields back in.
//!
//! ```text
//! IDLE --arm--> ARMED --change--> INJECTING --ok--> IDLE
//!                 ^                   |
//!                 +------failed-------+
//! ```
//!
//! `stop` returns to IDLE from any state.

mod debounce;
mod injector;
mod session;
mod watcher;

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

pub use debounce::Debouncer;
pub use injector::{Injector, RaceIniInjector};
pub use session::{FileEvent, WatchEvent, WatchState};
pub use watcher::{NameWatcher, RaceIniWatcher, WatchSettings};

use crate::error::Result;
use crate::ini::PatchReport;

pub const DEFAULT_INJECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Arm once and block until the name has been injected.
///
/// Failed attempts are logged and the watch continues. Returns `Ok(None)`
/// if nothing was injected before `timeout`.
pub fn wait_for_injection(
    settings: WatchSettings,
    injector: Arc<dyn Injector>,
    name: &str,
    timeout: Duration,
) -> Result<Option<PatchReport>> {
    let (tx, rx) = mpsc::sync_channel(8);
    let mut watcher: RaceIniWatcher = RaceIniWatcher::new(settings, injector, tx);
    let session = watcher.arm(name)?;
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            watcher.stop();
            info!("No change within {}s, giving up", timeout.as_secs());
            return Ok(None);
        }

        match rx.recv_timeout(remaining) {
            Ok(WatchEvent::Injected {
                session: id,
                report,
                ..
            }) if id == session => {
                watcher.stop();
                return Ok(Some(report));
            }
            Ok(WatchEvent::InjectionFailed { error, .. }) => {
                warn!("Injection failed, still waiting: {}", error);
            }
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                watcher.stop();
                return Ok(None);
            }
        }
    }
}
