//! CLI command implementations.

pub mod inject;
pub mod patch;
pub mod run;
pub mod seed;

use interceptor::{InterceptorConfig, PatchReport, RecentNames};
use owo_colors::OwoColorize;
use tracing::warn;

/// Put `name` at the top of the recent-names history.
pub(crate) fn remember(config: &InterceptorConfig, name: &str) {
    let path = config.recent_names_path();
    let mut recent = RecentNames::load(&path);
    if recent.record(name)
        && let Err(e) = recent.save(&path)
    {
        warn!("Could not save recent names: {}", e);
    }
}

/// Print the rewritten fields of a patch.
pub(crate) fn print_report(report: &PatchReport) {
    if report.is_empty() {
        println!("{}", "No name fields found in race.ini".yellow());
        return;
    }
    for change in &report.changes {
        if change.old_value == change.new_value {
            println!(
                "  [{}] {} = '{}' (unchanged)",
                change.section, change.key, change.new_value
            );
        } else {
            println!(
                "  [{}] {}: '{}' -> '{}'",
                change.section,
                change.key,
                change.old_value.dimmed(),
                change.new_value.green()
            );
        }
    }
}
