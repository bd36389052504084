//! Message Bus
//!
//! The match engine talks to clients only through named topics on a
//! publish/subscribe bus. Delivery is at-least-once and ordered per
//! topic as the bus delivers it; nothing more is assumed.

pub mod local;

use std::time::Duration;

use thiserror::Error;

pub use local::LocalBus;

/// Topic names.
pub mod topics {
    /// Encrypted map broadcasts.
    pub const MAP: &str = "game_map";
    /// Engine liveness pings.
    pub const ENGINE_KEEP_ALIVE: &str = "engine_keep_alive";
    /// `token:epochMillis` liveness from movables.
    pub const MOVABLE_KEEP_ALIVE: &str = "movable_keep_alive";
    /// `token:DIRECTION` movement commands.
    pub const MOVEMENT: &str = "movement";
    /// NPC join, accept, death and match end.
    pub const NPC_JOIN_LEAVE: &str = "npc_join_leave";
    /// Player-facing match updates.
    pub const PLAYER_GAME_UPDATES: &str = "player_game_updates";
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Topic it was published on.
    pub topic: String,
    /// UTF-8 payload.
    pub value: String,
}

/// Bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus side of a consumer went away.
    #[error("bus disconnected")]
    Disconnected,

    /// The bus refused a publish.
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Reason reported by the bus.
        reason: String,
    },
}

/// Producer side of the bus.
pub trait MessageBus: Send + Sync {
    /// Publish `value` on `topic`.
    fn publish(&self, topic: &str, value: &str) -> Result<(), BusError>;

    /// Open a consumer on the given topics.
    fn subscribe(&self, topics: &[&str]) -> Box<dyn BusConsumer>;
}

/// Consumer side of the bus.
pub trait BusConsumer: Send {
    /// Wait up to `timeout` for a batch of records. An empty batch means
    /// nothing arrived in time.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<BusRecord>, BusError>;
}
