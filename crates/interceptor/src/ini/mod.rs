//! Formatting-preserving edits of `race.ini`.
//!
//! - **Document**: raw lines with their terminators, plus the keys seen per section
//! - **Patch**: rewrite `(section, key)` targets in place, report what changed
//! - **Template**: render a fresh online-join `race.ini`

mod document;
mod patch;
mod template;

pub use document::{ConfigDocument, Line, LineEnding, decode_lossy};
pub use patch::{
    DRIVER_KEY, DRIVER_SECTION, PatchChange, PatchReport, PatchTarget, REMOTE_KEY,
    REMOTE_SECTION, driver_name_targets, patch_bytes, patch_text,
};
pub use template::{
    DEFAULT_HTTP_PORT, DEFAULT_SERVER_PORT, OnlineServer, render_race_ini, resolve_host,
};
