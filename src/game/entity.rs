//! Grid Entities
//!
//! Everything that occupies a cell. Food and mines are inert; NPCs and
//! players are leveled and movable, addressed by their session token.
//!
//! Mutable fields are individual atomics so the consumption loop, the
//! periodic tasks and NPC admission can touch entities without a global
//! lock.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::core::city::Cities;
use crate::core::position::Position;
use crate::players::PlayerRecord;

/// Identifier of the match an entity was inserted into.
pub type MatchId = Uuid;

/// State shared by every movable (and therefore leveled) entity.
#[derive(Debug)]
pub struct MovableState {
    token: String,
    level: AtomicI32,
    last_movement: AtomicI64,
    disconnected: AtomicBool,
}

impl MovableState {
    fn new(token: String, level: i32) -> Self {
        Self {
            token,
            level: AtomicI32::new(level.max(1)),
            last_movement: AtomicI64::new(0),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Session token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Raw level.
    pub fn level(&self) -> i32 {
        self.level.load(Ordering::SeqCst)
    }

    /// Epoch millis of the last movement or keep-alive.
    pub fn last_movement(&self) -> i64 {
        self.last_movement.load(Ordering::SeqCst)
    }

    /// Record activity at `now_ms`.
    pub fn touch(&self, now_ms: i64) {
        self.last_movement.store(now_ms, Ordering::SeqCst);
    }

    /// Whether the disconnect detector flagged this entity.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Set the disconnect flag, returning the previous value.
    pub fn set_disconnected(&self, value: bool) -> bool {
        self.disconnected.swap(value, Ordering::SeqCst)
    }
}

/// Variant of an entity.
#[derive(Debug)]
pub enum EntityKind {
    /// Raises a player's level when eaten.
    Food,
    /// Kills a player stepping on it.
    Mine,
    /// Bot-controlled movable.
    Npc(MovableState),
    /// Human-controlled movable.
    Player {
        /// Movable state.
        state: MovableState,
        /// Directory record.
        record: Arc<PlayerRecord>,
    },
}

/// One occupant of the grid.
#[derive(Debug)]
pub struct Entity {
    kind: EntityKind,
    position: AtomicU64,
    alive: AtomicBool,
    owner: OnceLock<MatchId>,
}

impl Entity {
    fn new(kind: EntityKind, position: Position) -> Self {
        Self {
            kind,
            position: AtomicU64::new(pack(position)),
            alive: AtomicBool::new(true),
            owner: OnceLock::new(),
        }
    }

    /// Food at `position`.
    pub fn food(position: Position) -> Self {
        Self::new(EntityKind::Food, position)
    }

    /// Mine at `position`.
    pub fn mine(position: Position) -> Self {
        Self::new(EntityKind::Mine, position)
    }

    /// NPC with the given level and token.
    pub fn npc(position: Position, level: i32, token: impl Into<String>) -> Self {
        Self::new(EntityKind::Npc(MovableState::new(token.into(), level)), position)
    }

    /// Player backed by a directory record.
    pub fn player(position: Position, level: i32, token: impl Into<String>, record: Arc<PlayerRecord>) -> Self {
        let state = MovableState::new(token.into(), level);
        Self::new(EntityKind::Player { state, record }, position)
    }

    /// Variant.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Current cell.
    pub fn position(&self) -> Position {
        unpack(self.position.load(Ordering::SeqCst))
    }

    pub(crate) fn set_position(&self, position: Position) {
        self.position.store(pack(position), Ordering::SeqCst);
    }

    /// Whether the entity is still in play.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Clear the alive flag, returning whether it was set.
    pub(crate) fn mark_dead(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    /// Match this entity belongs to, once inserted.
    pub fn owner(&self) -> Option<MatchId> {
        self.owner.get().copied()
    }

    /// Bind to a match. Fails if already bound to a different one.
    pub(crate) fn attach(&self, match_id: MatchId) -> bool {
        *self.owner.get_or_init(|| match_id) == match_id
    }

    /// Movable capability.
    pub fn movable(&self) -> Option<&MovableState> {
        match &self.kind {
            EntityKind::Npc(state) | EntityKind::Player { state, .. } => Some(state),
            EntityKind::Food | EntityKind::Mine => None,
        }
    }

    /// Directory record, for players.
    pub fn player_record(&self) -> Option<&Arc<PlayerRecord>> {
        match &self.kind {
            EntityKind::Player { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Session token, for movables.
    pub fn token(&self) -> Option<&str> {
        self.movable().map(MovableState::token)
    }

    /// Whether this is a player.
    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player { .. })
    }

    /// Raw level, for leveled entities.
    pub fn level(&self) -> Option<i32> {
        self.movable().map(MovableState::level)
    }

    /// Raise the level by one. No-op for unleveled entities.
    pub fn level_up(&self) {
        if let Some(state) = self.movable() {
            state.level.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Level used for fights.
    ///
    /// Players get the climate modifier of the city governing their current
    /// cell, floored at 1.
    pub fn effective_level(&self, cities: &Cities) -> Option<i32> {
        match &self.kind {
            EntityKind::Npc(state) => Some(state.level()),
            EntityKind::Player { state, record } => {
                let climate = cities.governing(self.position()).climate();
                Some((state.level() + record.climate_modifier(climate)).max(1))
            }
            EntityKind::Food | EntityKind::Mine => None,
        }
    }

    /// Three-character map glyph.
    pub fn glyph(&self) -> String {
        match &self.kind {
            EntityKind::Food => " F ".to_string(),
            EntityKind::Mine => " M ".to_string(),
            EntityKind::Npc(_) => "NPC".to_string(),
            EntityKind::Player { record, .. } => alias_glyph(&record.alias),
        }
    }

    /// Status line for movables: `alias (token): level`.
    pub fn display(&self, cities: &Cities) -> Option<String> {
        let level = self.effective_level(cities)?;
        match &self.kind {
            EntityKind::Npc(state) => Some(format!("NPC ({}): {}", state.token, level)),
            EntityKind::Player { state, record } => {
                Some(format!("{} ({}): {}", record.alias, state.token, level))
            }
            EntityKind::Food | EntityKind::Mine => None,
        }
    }
}

fn alias_glyph(alias: &str) -> String {
    let chars: Vec<char> = alias.chars().take(3).collect();
    match chars.len() {
        0 => "   ".to_string(),
        1 => format!(" {} ", chars[0]),
        2 => format!("{}{} ", chars[0], chars[1]),
        _ => chars.into_iter().collect(),
    }
}

fn pack(p: Position) -> u64 {
    (u64::from(p.x as u32) << 32) | u64::from(p.y as u32)
}

fn unpack(v: u64) -> Position {
    Position::new((v >> 32) as u32 as i32, v as u32 as i32)
}
