use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RigState {
    #[default]
    Free,
    Racing,
}

/// Player ids arrive as numbers or strings depending on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerId {
    Number(u64),
    Text(String),
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Number(n) => write!(f, "{}", n),
            PlayerId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

impl Player {
    /// `joined_at` parsed as RFC 3339.
    pub fn waiting_since(&self) -> Option<DateTime<Utc>> {
        let joined = self.joined_at.as_deref()?;
        DateTime::parse_from_rfc3339(joined)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigSnapshot {
    pub id: u32,
    #[serde(default)]
    pub state: RigState,
    #[serde(default)]
    pub current_player: Option<Player>,
    #[serde(default)]
    pub queue: Vec<Player>,
}

impl RigSnapshot {
    pub fn next_player(&self) -> Option<&Player> {
        self.queue.first()
    }

    pub fn is_free(&self) -> bool {
        self.state == RigState::Free
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub rigs: Vec<RigSnapshot>,
}

impl QueueSnapshot {
    pub fn rig(&self, id: u32) -> Option<&RigSnapshot> {
        self.rigs.iter().find(|r| r.id == id)
    }
}

/// Envelope around every server response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub response_object: Option<T>,
}

impl<T> ApiResponse<T> {
    /// The payload of a successful response; the server message otherwise.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.response_object)
        } else {
            Err(Error::Api(
                self.message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NextPlayerPayload {
    #[serde(default)]
    pub player: Option<Player>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartSessionRequest<'a> {
    pub state: RigState,
    pub player_id: &'a PlayerId,
}
