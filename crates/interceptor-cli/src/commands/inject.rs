//! One-shot interception without a queue server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use interceptor::{InterceptorConfig, RaceIniInjector, RecentNames, wait_for_injection};
use owo_colors::OwoColorize;

use super::{print_report, remember};

#[derive(Args, Debug)]
pub struct InjectArgs {
    /// Name to inject
    #[arg(short, long, required_unless_present_any = ["pick", "recent"])]
    pub name: Option<String>,

    /// Reuse a recently injected name (1 = newest, see --recent)
    #[arg(long, conflicts_with = "name")]
    pub pick: Option<usize>,

    /// List recently injected names and exit
    #[arg(long, conflicts_with_all = ["name", "pick"])]
    pub recent: bool,

    /// Seconds to wait for the launcher
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

pub fn run(config: &InterceptorConfig, args: &InjectArgs) -> Result<()> {
    let recent = RecentNames::load(config.recent_names_path());
    if args.recent {
        print_recent(&recent);
        return Ok(());
    }

    let name = resolve_name(args, &recent)?;
    let timeout = Duration::from_secs(args.timeout);
    let injector = Arc::new(RaceIniInjector::new(
        &config.race_ini,
        config.file_retry.strategy(),
    ));

    println!(
        "Waiting up to {}s for {} to be rewritten. Start the race now.",
        timeout.as_secs(),
        config.race_ini.display()
    );

    match wait_for_injection(config.watch_settings(), injector, &name, timeout)? {
        Some(report) => {
            println!("{}", format!("Injected '{}'", name).green());
            print_report(&report);
            remember(config, &name);
            Ok(())
        }
        None => bail!(
            "{} was not rewritten within {}s",
            config.race_ini.display(),
            timeout.as_secs()
        ),
    }
}

fn resolve_name(args: &InjectArgs, recent: &RecentNames) -> Result<String> {
    if let Some(name) = &args.name {
        return Ok(name.clone());
    }
    let Some(pick) = args.pick else {
        bail!("Give a name with --name or pick one with --pick");
    };
    match pick.checked_sub(1).and_then(|i| recent.get(i)) {
        Some(name) => Ok(name.to_string()),
        None => bail!("No recent name #{} ({} saved)", pick, recent.len()),
    }
}

fn print_recent(recent: &RecentNames) {
    if recent.is_empty() {
        println!("{}", "No names injected yet".yellow());
        return;
    }
    for (i, name) in recent.names().iter().enumerate() {
        println!("{:>3}. {}", i + 1, name);
    }
}
