//! Queue server access.
//!
//! - **Client**: blocking REST calls for one rig, with retry on transient failures
//! - **Feed**: background polling of the queue snapshot
//! - **Types**: wire format of players, rigs and the response envelope

mod client;
mod feed;
mod types;

pub use client::{Backend, BackendClient, BackendConfig};
pub use feed::{FeedEvent, QueueFeed};
pub use types::{ApiResponse, Player, PlayerId, QueueSnapshot, RigSnapshot, RigState};
