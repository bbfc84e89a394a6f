//! Write a fresh online-join race.ini.

use std::fs;

use anyhow::{Context, Result, bail};
use clap::Args;
use interceptor::ini::{DEFAULT_HTTP_PORT, DEFAULT_SERVER_PORT, resolve_host};
use interceptor::{FsAccess, InterceptorConfig, OnlineServer, render_race_ini, write_with_retry};
use tracing::info;

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Driver name written into the file
    #[arg(short, long)]
    pub name: String,

    /// Server address; hostnames are resolved to IPv4
    #[arg(long, env = "AC_SERVER_IP")]
    pub server_ip: String,

    #[arg(long, env = "AC_SERVER_PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub server_port: u16,

    #[arg(long, env = "AC_SERVER_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    #[arg(long, env = "AC_SERVER_NAME", default_value = "Race Server")]
    pub server_name: String,

    #[arg(long, env = "AC_CAR_ID")]
    pub car_id: String,

    #[arg(long, default_value = "")]
    pub skin: String,

    #[arg(long, env = "AC_STEAM_ID", default_value = "")]
    pub steam_id: String,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

impl SeedArgs {
    fn server(&self) -> OnlineServer {
        OnlineServer {
            server_ip: resolve_host(&self.server_ip),
            server_port: self.server_port,
            http_port: self.http_port,
            server_name: self.server_name.clone(),
            car_id: self.car_id.clone(),
            car_skin: self.skin.clone(),
            steam_id: self.steam_id.clone(),
            driver_name: self.name.clone(),
            ..OnlineServer::default()
        }
    }
}

pub fn run(config: &InterceptorConfig, args: &SeedArgs) -> Result<()> {
    let path = &config.race_ini;
    if path.exists() && !args.force {
        bail!("{} already exists, pass --force to replace it", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let server = args.server();
    let content = render_race_ini(&server);
    write_with_retry(&FsAccess, path, content.as_bytes(), &config.file_retry.strategy())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        "Seeded {} for {}:{} as '{}'",
        path.display(),
        server.server_ip,
        server.server_port,
        server.driver_name
    );
    println!("Wrote {}", path.display());
    Ok(())
}
