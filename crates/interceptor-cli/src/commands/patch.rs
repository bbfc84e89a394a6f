//! Immediate patch of race.ini.

use anyhow::{Context, Result};
use interceptor::{InterceptorConfig, Injector, RaceIniInjector};

use super::{print_report, remember};

pub fn run(config: &InterceptorConfig, name: &str) -> Result<()> {
    let injector = RaceIniInjector::new(&config.race_ini, config.file_retry.strategy());
    let report = injector
        .inject(name)
        .with_context(|| format!("Failed to patch {}", config.race_ini.display()))?;

    println!("Patched {}", config.race_ini.display());
    print_report(&report);
    remember(config, name);
    Ok(())
}
