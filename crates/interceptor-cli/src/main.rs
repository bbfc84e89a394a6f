use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interceptor::InterceptorConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod input;

#[derive(Parser)]
#[command(name = "interceptor")]
#[command(about = "Sim-racing rig client with race.ini name injection", version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// race.ini to watch and patch
    #[arg(long, global = true, env = "RACE_INI")]
    race_ini: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rig client against the queue server
    Run(commands::run::RunArgs),
    /// Wait for the launcher to rewrite race.ini, then inject a name
    Inject(commands::inject::InjectArgs),
    /// Write a name into race.ini right away
    Patch {
        #[arg(short, long)]
        name: String,
    },
    /// Write a fresh online-join race.ini
    Seed(commands::seed::SeedArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "interceptor=debug"
    } else {
        "interceptor=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config = load_config(cli.config.as_deref(), cli.race_ini)?;

    match cli.command {
        Commands::Run(args) => commands::run::run(&config, &args),
        Commands::Inject(args) => commands::inject::run(&config, &args),
        Commands::Patch { name } => commands::patch::run(&config, &name),
        Commands::Seed(args) => commands::seed::run(&config, &args),
    }
}

fn load_config(
    path: Option<&std::path::Path>,
    race_ini: Option<PathBuf>,
) -> Result<InterceptorConfig> {
    let base = match path {
        Some(path) => InterceptorConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => InterceptorConfig::default(),
    };

    let mut builder = InterceptorConfig::builder().base(base);
    if let Some(race_ini) = race_ini {
        builder = builder.race_ini(race_ini);
    }
    let config = builder.build();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inject() {
        let cli = Cli::try_parse_from([
            "interceptor",
            "--race-ini",
            "cfg/race.ini",
            "inject",
            "--name",
            "Alice",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.race_ini, Some(PathBuf::from("cfg/race.ini")));
        match cli.command {
            Commands::Inject(args) => {
                assert_eq!(args.name.as_deref(), Some("Alice"));
                assert_eq!(args.timeout, 30);
                assert!(!args.recent);
            }
            _ => panic!("expected inject"),
        }
    }

    #[test]
    fn test_parse_inject_recent_options() {
        let cli = Cli::try_parse_from(["interceptor", "inject", "--pick", "2"]).unwrap();
        match cli.command {
            Commands::Inject(args) => {
                assert_eq!(args.pick, Some(2));
                assert!(args.name.is_none());
            }
            _ => panic!("expected inject"),
        }

        assert!(Cli::try_parse_from(["interceptor", "inject", "--recent"]).is_ok());
        assert!(Cli::try_parse_from(["interceptor", "inject"]).is_err());
        assert!(
            Cli::try_parse_from(["interceptor", "inject", "--name", "A", "--pick", "1"]).is_err()
        );
    }

    #[test]
    fn test_inject_rejects_zero_timeout() {
        let result =
            Cli::try_parse_from(["interceptor", "inject", "--name", "A", "--timeout", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_race_ini_flag_overrides_default() {
        let config = load_config(None, Some(PathBuf::from("/tmp/race.ini"))).unwrap();
        assert_eq!(config.race_ini, PathBuf::from("/tmp/race.ini"));
    }
}
