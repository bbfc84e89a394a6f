//! Prelude module for convenient imports
//!
//! ```ignore
//! use interceptor::prelude::*;
//! ```

// Configuration
pub use crate::config::InterceptorConfig;

// Error handling
pub use crate::error::{Error, Result};

// Name history
pub use crate::recent::RecentNames;

// Patching
pub use crate::ini::{PatchReport, PatchTarget, driver_name_targets, patch_bytes, patch_text};

// Watching
pub use crate::watch::{
    Injector, NameWatcher, RaceIniInjector, RaceIniWatcher, WatchEvent, WatchState,
};

// Queue server and controller
pub use crate::backend::{Backend, BackendClient, BackendConfig, QueueFeed};
pub use crate::controller::{Command, ControllerEvent, SessionController};
