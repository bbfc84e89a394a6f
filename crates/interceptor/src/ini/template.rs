//! A complete `race.ini` for joining an online server.
//!
//! Used to seed a rig's config directory so that the launcher has something
//! to rewrite on the first race.

use std::net::{IpAddr, ToSocketAddrs};

use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_SERVER_PORT: u16 = 9600;
pub const DEFAULT_HTTP_PORT: u16 = 8081;

/// Online server and car selection for one rig.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OnlineServer {
    pub server_ip: String,
    pub server_port: u16,
    pub http_port: u16,
    pub server_name: String,
    pub car_id: String,
    pub car_skin: String,
    pub steam_id: String,
    pub driver_name: String,
    pub nationality: String,
}

impl Default for OnlineServer {
    fn default() -> Self {
        Self {
            server_ip: String::new(),
            server_port: DEFAULT_SERVER_PORT,
            http_port: DEFAULT_HTTP_PORT,
            server_name: "Race Server".to_string(),
            car_id: String::new(),
            car_skin: String::new(),
            steam_id: String::new(),
            driver_name: "Driver".to_string(),
            nationality: String::new(),
        }
    }
}

/// Resolve a hostname to its first IPv4 address, or return it unchanged.
pub fn resolve_host(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    match (host, 0).to_socket_addrs() {
        Ok(addrs) => {
            let mut addrs: Vec<_> = addrs.collect();
            addrs.sort_by_key(|a| !a.is_ipv4());
            match addrs.first() {
                Some(addr) => addr.ip().to_string(),
                None => host.to_string(),
            }
        }
        Err(e) => {
            debug!("Could not resolve {}: {}", host, e);
            host.to_string()
        }
    }
}

/// Render the file with the server address taken verbatim.
pub fn render_race_ini(server: &OnlineServer) -> String {
    let port = server.server_port.to_string();
    let http_port = server.http_port.to_string();

    let sections: [(&str, Vec<(&str, &str)>); 16] = [
        ("HEADER", vec![("VERSION", "1"), ("PRESET", "0")]),
        (
            "RACE",
            vec![
                ("CARS", "1"),
                ("AI_LEVEL", "100"),
                ("DRIFT_MODE", "0"),
                ("RACE_LAPS", "5"),
                ("REVERSED_GRID_RACE_POSITIONS", "0"),
                ("PENALTIES", "1"),
                ("DAMAGE", "100"),
                ("TYRE_BLANKETS", "0"),
                ("JUMP_START_PENALTY", "0"),
                ("FORCE_VIRTUAL_MIRROR", "0"),
            ],
        ),
        (
            "REMOTE",
            vec![
                ("ACTIVE", "1"),
                ("SERVER_IP", server.server_ip.as_str()),
                ("SERVER_PORT", port.as_str()),
                ("SERVER_HTTP_PORT", http_port.as_str()),
                ("NAME", server.server_name.as_str()),
                ("TEAM", ""),
                ("GUID", server.steam_id.as_str()),
                ("REQUESTED_CAR", server.car_id.as_str()),
                ("PASSWORD", ""),
                ("SERVER_NAME", server.server_name.as_str()),
                ("EXTENDED_MODE", "1"),
            ],
        ),
        (
            "SESSION",
            vec![
                ("NAME", server.driver_name.as_str()),
                ("NATIONALITY", server.nationality.as_str()),
                ("NATION_CODE", ""),
                ("TEAM", ""),
                ("CLASS", ""),
                ("GUID", server.steam_id.as_str()),
            ],
        ),
        ("AUTOSPAWN", vec![("ACTIVE", "0")]),
        (
            "CAR_0",
            vec![
                ("MODEL", server.car_id.as_str()),
                ("SKIN", server.car_skin.as_str()),
                ("DRIVER_NAME", server.driver_name.as_str()),
                ("NATIONALITY", server.nationality.as_str()),
                ("NATION_CODE", ""),
                ("SETUP", ""),
                ("SETUP_LOAD_FROM_CLOUD", "0"),
                ("SETUP_SAVE_TO_CLOUD", "0"),
                ("BALLAST", "0"),
                ("RESTRICTOR", "0"),
                ("AI_LEVEL", "100"),
                ("AI_AGGRO", "50"),
            ],
        ),
        (
            "DRIVER",
            vec![
                ("GUID", server.steam_id.as_str()),
                ("DRIVER_NAME", server.driver_name.as_str()),
                ("NATIONALITY", server.nationality.as_str()),
            ],
        ),
        ("SERVER", vec![("NAME", server.server_name.as_str())]),
        ("TEMPERATURE", vec![("AMBIENT", "26"), ("ROAD", "32")]),
        ("WEATHER", vec![("NAME", "3_clear")]),
        (
            "LIGHTING",
            vec![
                ("SUN_ANGLE", "-16"),
                ("TIME_MULT", "1"),
                ("CLOUD_SPEED", "0.2"),
            ],
        ),
        (
            "DYNAMIC_TRACK",
            vec![
                ("SESSION_START", "95"),
                ("RANDOMNESS", "1"),
                ("SESSION_TRANSFER", "90"),
                ("LAP_GAIN", "1"),
            ],
        ),
        (
            "GROOVE",
            vec![
                ("VIRTUAL_LAPS", "30"),
                ("MAX_LAPS", "30"),
                ("STARTING_LAPS", "0"),
            ],
        ),
        ("BENCHMARK", vec![("ACTIVE", "0")]),
        ("RESTART", vec![("ACTIVE", "0")]),
        (
            "REPLAY",
            vec![
                ("ACTIVE", "0"),
                ("FILENAME", ""),
                ("START_ON", "0"),
                ("MILLISECONDS_BETWEEN_FRAMES", "200"),
                ("END_ON_SESSION_END", "0"),
            ],
        ),
    ];

    let mut out = String::new();
    for (name, entries) in &sections {
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        for (key, value) in entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::{ConfigDocument, driver_name_targets, patch_text};

    fn server() -> OnlineServer {
        OnlineServer {
            server_ip: "192.168.1.20".to_string(),
            http_port: 8082,
            ..OnlineServer::default()
        }
    }

    #[test]
    fn test_render_contains_player_fields() {
        let text = render_race_ini(&OnlineServer {
            driver_name: "Alice".to_string(),
            car_id: "ks_mazda_miata".to_string(),
            ..server()
        });
        let doc = ConfigDocument::parse(&text);
        assert_eq!(doc.value("CAR_0", "DRIVER_NAME"), Some("Alice"));
        assert_eq!(doc.value("CAR_0", "MODEL"), Some("ks_mazda_miata"));
        assert_eq!(doc.value("REMOTE", "SERVER_IP"), Some("192.168.1.20"));
        assert_eq!(doc.value("REMOTE", "SERVER_PORT"), Some("9600"));
        assert_eq!(doc.value("REMOTE", "SERVER_HTTP_PORT"), Some("8082"));
        assert_eq!(doc.value("REMOTE", "NAME"), Some("Race Server"));
        assert_eq!(doc.sections().count(), 16);
    }

    #[test]
    fn test_rendered_file_is_patchable() {
        let text = render_race_ini(&server());
        let (patched, report) = patch_text(&text, &driver_name_targets("Bob"));
        assert_eq!(report.changes.len(), 2);
        let doc = ConfigDocument::parse(&patched);
        assert_eq!(doc.value("CAR_0", "DRIVER_NAME"), Some("Bob"));
        assert_eq!(doc.value("REMOTE", "NAME"), Some("Bob"));
        assert_eq!(doc.value("DRIVER", "DRIVER_NAME"), Some("Driver"));
        assert_eq!(doc.value("SERVER", "NAME"), Some("Race Server"));
    }

    #[test]
    fn test_render_format() {
        let text = render_race_ini(&server());
        assert!(text.starts_with("[HEADER]\nVERSION=1\nPRESET=0\n\n[RACE]\n"));
        assert!(text.ends_with("END_ON_SESSION_END=0\n\n"));
        assert!(!text.contains(" = "));
    }

    #[test]
    fn test_resolve_host_passes_ip_through() {
        assert_eq!(resolve_host("10.1.2.3"), "10.1.2.3");
        assert_eq!(resolve_host("::1"), "::1");
    }
}
