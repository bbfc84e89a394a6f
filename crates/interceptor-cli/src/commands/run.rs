//! Full rig client mode.

use std::sync::Arc;
use std::sync::mpsc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use interceptor::{
    Backend, BackendClient, BackendConfig, ControllerEvent, ControllerStatus, InterceptorConfig,
    QueueFeed, RaceIniInjector, RaceIniWatcher, RigState, SessionController, StopSignal,
    WatchState,
};
use owo_colors::OwoColorize;
use tracing::info;

use crate::input;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Queue server address, e.g. http://192.168.1.10
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: String,

    #[arg(long, env = "BACKEND_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub backend_port: u16,

    /// This rig's number on the queue server
    #[arg(long, env = "RIG_ID", value_parser = clap::value_parser!(u32).range(1..))]
    pub rig_id: u32,
}

pub fn run(config: &InterceptorConfig, args: &RunArgs) -> Result<()> {
    let backend_config =
        BackendConfig::new(&args.backend_url, Some(args.backend_port), args.rig_id);
    let client = BackendClient::new(backend_config).context("Invalid queue server settings")?;
    info!("Queue server: {} (rig {})", client.base_url(), client.rig_id());
    let backend: Arc<dyn Backend> = Arc::new(client);

    // Setup graceful shutdown handler
    let shutdown = Arc::new(StopSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let (tx, rx) = mpsc::sync_channel::<ControllerEvent>(config.channel_capacity);

    let injector = Arc::new(RaceIniInjector::new(
        &config.race_ini,
        config.file_retry.strategy(),
    ));
    let watcher = RaceIniWatcher::new(config.watch_settings(), injector, tx.clone());
    let mut feed = QueueFeed::spawn(
        Arc::clone(&backend),
        args.rig_id,
        config.poll_interval(),
        tx.clone(),
    )
    .context("Failed to start queue feed")?;
    let _keyboard_handle = input::spawn_keyboard_monitor(tx, Arc::clone(&shutdown));

    println!("{}", format!("Race Interceptor - Rig {}", args.rig_id).bold());
    println!("Watching {}", config.race_ini.display());
    println!("Keys: [s] start race  [k] skip player  [e] end session  [q/Esc] quit");

    let mut controller = SessionController::new(backend, watcher, config.hot_phase_timeout());
    controller.run(&rx, &shutdown, print_status);

    feed.stop();
    shutdown.trigger();
    println!("Stopped after {} races.", controller.status().races);
    Ok(())
}

fn print_status(status: &ControllerStatus) {
    let time = Local::now().format("%H:%M:%S");

    let connection = if status.connected {
        "online".green().to_string()
    } else {
        "offline".red().to_string()
    };

    let rig = match status.rig_state {
        RigState::Free => "FREE".green().to_string(),
        RigState::Racing => "RACING".yellow().to_string(),
    };

    let next = match &status.next_player {
        Some(player) => format!("{} ({} waiting)", player.name.bold(), status.queue_len),
        None => "nobody waiting".dimmed().to_string(),
    };

    let watch = match (status.watch_state, &status.hot_player) {
        (WatchState::Idle, _) | (_, None) => String::new(),
        (state, Some(name)) => format!(" | {} {}", state.to_string().cyan(), name),
    };

    let racing = status
        .racing_since
        .map(|since| format!(" | racing {}m", (Local::now() - since).num_minutes()))
        .unwrap_or_default();

    println!(
        "[{}] {} | rig {} | next: {}{}{} | races: {}",
        time, connection, rig, next, watch, racing, status.races
    );
    if !status.message.is_empty() {
        println!("    {}", status.message);
    }
}
