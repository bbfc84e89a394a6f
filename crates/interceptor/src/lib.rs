//! # interceptor
//!
//! Core library for the sim-racing rig client.
//!
//! This crate provides:
//! - Formatting-preserving edits of `race.ini` (player name injection)
//! - Retrying file I/O for files another process keeps open
//! - A debounced watcher that injects the armed name after the launcher
//!   rewrites the file
//! - A blocking client and polling feed for the queue server
//! - The session controller tying queue, operator commands and watcher together
//! - A short history of injected names

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod fileio;
pub mod ini;
pub mod prelude;
pub mod recent;
pub mod retry;
pub mod signal;
pub mod watch;

pub use backend::{
    ApiResponse, Backend, BackendClient, BackendConfig, FeedEvent, Player, PlayerId, QueueFeed,
    QueueSnapshot, RigSnapshot, RigState,
};
pub use config::{
    FileRetry, InterceptorConfig, InterceptorConfigBuilder, WatchTimings, default_race_ini_path,
};
pub use controller::{Command, ControllerEvent, ControllerStatus, Flow, SessionController};
pub use error::{Error, Result};
pub use fileio::{FileAccess, FsAccess, read_with_retry, write_with_retry};
pub use ini::{
    ConfigDocument, OnlineServer, PatchChange, PatchReport, PatchTarget, driver_name_targets,
    patch_bytes, patch_text, render_race_ini,
};
pub use recent::{MAX_RECENT_NAMES, RecentNames, default_recent_names_path};
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryStrategy};
pub use signal::StopSignal;
pub use watch::{
    DEFAULT_INJECT_TIMEOUT, FileEvent, Injector, NameWatcher, RaceIniInjector, RaceIniWatcher,
    WatchEvent, WatchSettings, WatchState, wait_for_injection,
};
