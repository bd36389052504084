//! Game Logic Module
//!
//! The match engine and everything it mutates.
//!
//! ## Module Structure
//!
//! - `entity`: Food, mines, NPCs and players
//! - `state`: Cell and token indices of the world
//! - `collision`: Interaction rules between a mover and an occupant
//! - `events`: Bus message parsing and notification payloads
//! - `engine`: Match lifecycle, movement and NPC admission
//! - `tasks`: Periodic timers (map broadcast, keep-alive, snapshots, disconnects)
//! - `map`: Plain-text map rendering
//! - `snapshot`: Crash-recovery document
//! - `creator`: Fresh match seeding

pub mod collision;
pub mod creator;
pub mod engine;
pub mod entity;
pub mod events;
pub mod map;
pub mod snapshot;
pub mod state;
pub mod tasks;

// Re-export key types
pub use creator::create_fresh_match;
pub use engine::{Match, MatchError, MatchSettings};
pub use entity::{Entity, EntityKind};
pub use events::Direction;
pub use snapshot::{MatchSnapshot, SnapshotError};
pub use state::WorldState;
