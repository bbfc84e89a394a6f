use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::types::{
    ApiResponse, NextPlayerPayload, Player, PlayerId, QueueSnapshot, RigState,
    StartSessionRequest,
};
use crate::error::{Error, Result};
use crate::retry::{ExponentialBackoff, RetryStrategy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Queue server operations for one rig.
pub trait Backend: Send + Sync {
    /// Mark the rig as racing with `player`.
    fn start_session(&self, player: &PlayerId) -> Result<()>;

    /// Finish the current session and free the rig.
    fn complete_session(&self) -> Result<()>;

    /// Drop the head of this rig's queue.
    fn skip_player(&self) -> Result<()>;

    fn next_player(&self) -> Result<Option<Player>>;

    fn fetch_queue(&self) -> Result<QueueSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub rig_id: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl BackendConfig {
    /// `url` and `port` are joined as `{url}:{port}` when a port is given.
    pub fn new(url: &str, port: Option<u16>, rig_id: u32) -> Self {
        let url = url.trim_end_matches('/');
        let base_url = match port {
            Some(port) => format!("{}:{}", url, port),
            None => url.to_string(),
        };
        Self {
            base_url,
            rig_id,
            request_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rig_id == 0 {
            return Err(Error::Config("rig id must be at least 1".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "backend url must start with http:// or https://, got {}",
                self.base_url
            )));
        }
        Ok(())
    }

    fn retry(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.max_retries, self.initial_backoff, MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

/// Blocking HTTP client for the queue server.
pub struct BackendClient {
    agent: ureq::Agent,
    config: BackendConfig,
    retry: ExponentialBackoff,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.request_timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let retry = config.retry();
        Ok(Self {
            agent,
            config,
            retry,
        })
    }

    pub fn rig_id(&self) -> u32 {
        self.config.rig_id
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let url = self.url(path);
        let max = self.retry.max_attempts();
        let mut attempt = 1;
        loop {
            match self.send_once(method, &url, body) {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_retryable() && self.retry.can_retry(attempt) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "{:?} {} failed (attempt {}/{}): {}, retrying in {}ms",
                        method,
                        url,
                        attempt,
                        max,
                        e,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        debug!("{:?} {}", method, url);
        let sent = match (method, body) {
            (Method::Get, _) => self.agent.get(url).call(),
            (Method::Post, Some(body)) => self.agent.post(url).send_json(body),
            (Method::Post, None) => self.agent.post(url).send_empty(),
        };
        let mut response = sent.map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let envelope = response.body_mut().read_json::<ApiResponse<T>>();

        if !(200..300).contains(&status) {
            let message = envelope
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("request to {} failed", url));
            return Err(Error::Http { status, message });
        }

        envelope
            .map_err(|e| Error::Api(format!("invalid response from {}: {}", url, e)))?
            .into_result()
    }
}

impl Backend for BackendClient {
    fn start_session(&self, player: &PlayerId) -> Result<()> {
        let body = serde_json::to_value(StartSessionRequest {
            state: RigState::Racing,
            player_id: player,
        })?;
        self.request::<serde_json::Value>(
            Method::Post,
            &format!("rigs/{}/state", self.config.rig_id),
            Some(&body),
        )?;
        info!("Session started for player {}", player);
        Ok(())
    }

    fn complete_session(&self) -> Result<()> {
        self.request::<serde_json::Value>(
            Method::Post,
            &format!("queue/complete/{}", self.config.rig_id),
            None,
        )?;
        info!("Session completed, rig {} is free", self.config.rig_id);
        Ok(())
    }

    fn skip_player(&self) -> Result<()> {
        self.request::<serde_json::Value>(
            Method::Post,
            &format!("queue/skip/{}", self.config.rig_id),
            None,
        )?;
        info!("Skipped next player on rig {}", self.config.rig_id);
        Ok(())
    }

    fn next_player(&self) -> Result<Option<Player>> {
        let payload: Option<NextPlayerPayload> = self.request(
            Method::Get,
            &format!("queue/next/{}", self.config.rig_id),
            None,
        )?;
        Ok(payload.and_then(|p| p.player))
    }

    fn fetch_queue(&self) -> Result<QueueSnapshot> {
        let snapshot: Option<QueueSnapshot> = self.request(Method::Get, "queue", None)?;
        Ok(snapshot.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    /// Answers one connection per canned response and returns the raw
    /// requests it saw.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                let reply = format!(
                    "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
            requests
        });
        (url, handle)
    }

    fn request_body(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client(url: &str) -> BackendClient {
        let mut config = BackendConfig::new(url, None, 3);
        config.initial_backoff = Duration::from_millis(5);
        BackendClient::new(config).unwrap()
    }

    #[test]
    fn test_config_joins_port() {
        let config = BackendConfig::new("http://10.0.0.2/", Some(3000), 1);
        assert_eq!(config.base_url, "http://10.0.0.2:3000");
        config.validate().unwrap();
    }

    #[test]
    fn test_config_rejects_rig_zero() {
        let config = BackendConfig::new("http://localhost", Some(3000), 0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(BackendClient::new(config).is_err());
    }

    #[test]
    fn test_start_session_posts_state() {
        let (url, server) = serve(vec![(200, r#"{"success":true}"#)]);
        client(&url)
            .start_session(&PlayerId::Text("p1".into()))
            .unwrap();

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /rigs/3/state "));
        let body = request_body(&requests[0]);
        assert_eq!(body["state"], "RACING");
        assert_eq!(body["playerId"], "p1");
    }

    #[test]
    fn test_next_player() {
        let (url, server) = serve(vec![
            (
                200,
                r#"{"success":true,"responseObject":{"player":{"id":5,"name":"Alice"}}}"#,
            ),
            (200, r#"{"success":true,"responseObject":{"player":null}}"#),
        ]);
        let client = client(&url);
        let player = client.next_player().unwrap().unwrap();
        assert_eq!(player.name, "Alice");
        assert!(client.next_player().unwrap().is_none());

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /queue/next/3 "));
    }

    #[test]
    fn test_fetch_queue() {
        let (url, server) = serve(vec![(
            200,
            r#"{"success":true,"responseObject":{"rigs":[{"id":3,"state":"FREE","currentPlayer":null,"queue":[{"id":1,"name":"Bob"}]}]}}"#,
        )]);
        let snapshot = client(&url).fetch_queue().unwrap();
        assert_eq!(
            snapshot.rig(3).unwrap().next_player().unwrap().name,
            "Bob"
        );
        server.join().unwrap();
    }

    #[test]
    fn test_client_error_carries_server_message() {
        let (url, server) = serve(vec![(
            409,
            r#"{"success":false,"message":"Rig already racing"}"#,
        )]);
        let err = client(&url).complete_session().unwrap_err();
        match err {
            Error::Http { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "Rig already racing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn test_server_error_is_retried() {
        let (url, server) = serve(vec![
            (503, r#"{"success":false}"#),
            (500, "oops"),
            (200, r#"{"success":true}"#),
        ]);
        client(&url).skip_player().unwrap();

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.starts_with("POST /queue/skip/3 ")));
    }

    #[test]
    fn test_unsuccessful_envelope_is_api_error() {
        let (url, server) = serve(vec![(200, r#"{"success":false,"message":"Queue empty"}"#)]);
        let err = client(&url).skip_player().unwrap_err();
        assert!(matches!(err, Error::Api(ref m) if m == "Queue empty"));
        server.join().unwrap();
    }

    #[test]
    fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&url).fetch_queue().unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
