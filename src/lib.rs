//! # Gridmatch Server
//!
//! Session-based multiplayer grid match: clients are admitted over a
//! checksummed session protocol, then play through a publish/subscribe bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GRIDMATCH SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── position.rs - Grid coordinates and wrap-around          │
//! │  ├── city.rs     - Quadrant cities and climates              │
//! │  └── crypto.rs   - Password digests and the match cipher     │
//! │                                                              │
//! │  network/        - Session protocol and services             │
//! │  ├── framing.rs  - Control chars and checksummed frames      │
//! │  ├── session.rs  - Handshake, exchange, termination          │
//! │  ├── server.rs   - Accept loop with bounded workers          │
//! │  ├── token.rs    - Single-flight token issuance              │
//! │  ├── accounts.rs - Account create/edit                       │
//! │  └── client.rs   - Initiator helpers                         │
//! │                                                              │
//! │  players/        - Player directory                          │
//! │  bus/            - Topics and the in-process bus             │
//! │                                                              │
//! │  game/           - Match engine                              │
//! │  ├── state.rs    - Concurrent cell and token indices         │
//! │  ├── engine.rs   - Movement, interactions, lifecycle         │
//! │  ├── tasks.rs    - Periodic timers                           │
//! │  └── snapshot.rs - Crash recovery                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Sessions, timers, NPC admissions and the bus consumer thread all run
//! against the same world. The world's two indices are concurrent maps and
//! every mutable entity field is its own atomic; nothing takes a global
//! lock.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod bus;
pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod players;

// Re-export commonly used types
pub use bus::{BusConsumer, BusRecord, LocalBus, MessageBus};
pub use config::{ConfigError, EngineConfig};
pub use crate::core::{Cities, MatchCipher, Position};
pub use game::{create_fresh_match, Match, MatchSettings, MatchSnapshot};
pub use network::{AccountService, SessionConfig, SocketSession, TokenService};
pub use players::PlayerDirectory;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grid width and height.
pub const GRID_SIZE: i32 = 20;

/// Side of one city quadrant.
pub const QUADRANT_SIZE: i32 = GRID_SIZE / 2;

/// Cities per match, one per quadrant.
pub const CITY_COUNT: usize = 4;

/// Default token service port.
pub const DEFAULT_TOKEN_PORT: u16 = 6002;
