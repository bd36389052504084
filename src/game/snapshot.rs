//! Recovery Snapshot
//!
//! The match document persisted on every save tick and deleted when the
//! match ends:
//!
//! ```text
//! { "cities":   [ {name, temperature} x4 ],
//!   "map":      [ {type, position: [x, y], level?, token?, player?, player-name?} ],
//!   "password": { "secret": ... } }
//! ```
//!
//! Element types form a closed set. Restoring is all or nothing: any bad
//! element, a wrong city count or a missing secret fails the whole load.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::city::Cities;
use crate::core::crypto::{CipherError, MatchCipher};
use crate::core::position::Position;
use crate::game::entity::{Entity, EntityKind};
use crate::players::PlayerDirectory;

/// Snapshot errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading or writing the file failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document does not parse (unknown element type, wrong city
    /// count, missing field).
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An element lies outside the grid.
    #[error("element at {0} is outside the grid")]
    OutOfBounds(Position),

    /// A leveled element has a level below 1.
    #[error("element at {position} has invalid level {level}")]
    InvalidLevel {
        /// Element position.
        position: Position,
        /// Stored level.
        level: i32,
    },

    /// Two movable elements carry the same token.
    #[error("duplicate token {0}")]
    DuplicateToken(String),

    /// A player element references an unknown player.
    #[error("unknown player {0}")]
    UnknownPlayer(Uuid),

    /// The cipher secret is unusable.
    #[error("bad cipher secret: {0}")]
    Secret(#[from] CipherError),
}

/// One persisted grid element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementSnapshot {
    /// Food.
    Food {
        /// Cell.
        position: Position,
    },
    /// Mine.
    Mine {
        /// Cell.
        position: Position,
    },
    /// NPC.
    Npc {
        /// Cell.
        position: Position,
        /// Raw level.
        level: i32,
        /// Session token.
        token: String,
    },
    /// Player.
    Player {
        /// Cell.
        position: Position,
        /// Raw level.
        level: i32,
        /// Session token.
        token: String,
        /// Directory id.
        player: Uuid,
        /// Alias at save time, informational.
        #[serde(rename = "player-name", default)]
        player_name: String,
    },
}

impl ElementSnapshot {
    /// Capture a live entity.
    pub fn capture(entity: &Entity) -> Self {
        let position = entity.position();
        match entity.kind() {
            EntityKind::Food => Self::Food { position },
            EntityKind::Mine => Self::Mine { position },
            EntityKind::Npc(state) => Self::Npc {
                position,
                level: state.level(),
                token: state.token().to_string(),
            },
            EntityKind::Player { state, record } => Self::Player {
                position,
                level: state.level(),
                token: state.token().to_string(),
                player: record.id,
                player_name: record.alias.clone(),
            },
        }
    }

    /// Rebuild the entity, resolving players through `directory`.
    pub fn restore(&self, directory: &PlayerDirectory) -> Result<Entity, SnapshotError> {
        let position = self.position();
        if !position.in_bounds() {
            return Err(SnapshotError::OutOfBounds(position));
        }
        let check_level = |level: i32| {
            if level < 1 {
                Err(SnapshotError::InvalidLevel { position, level })
            } else {
                Ok(level)
            }
        };
        Ok(match self {
            Self::Food { .. } => Entity::food(position),
            Self::Mine { .. } => Entity::mine(position),
            Self::Npc { level, token, .. } => Entity::npc(position, check_level(*level)?, token.clone()),
            Self::Player { level, token, player, .. } => {
                let record = directory.by_id(player).ok_or(SnapshotError::UnknownPlayer(*player))?;
                Entity::player(position, check_level(*level)?, token.clone(), record)
            }
        })
    }

    /// Stored token, for movable elements.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Npc { token, .. } | Self::Player { token, .. } => Some(token),
            Self::Food { .. } | Self::Mine { .. } => None,
        }
    }

    /// Stored position.
    pub fn position(&self) -> Position {
        match self {
            Self::Food { position }
            | Self::Mine { position }
            | Self::Npc { position, .. }
            | Self::Player { position, .. } => *position,
        }
    }
}

/// The cipher secret block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretSnapshot {
    /// Shared match secret.
    pub secret: String,
}

/// Whole-match document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// The four cities, quadrant order.
    pub cities: Cities,
    /// Every grid element.
    pub map: Vec<ElementSnapshot>,
    /// Cipher secret.
    pub password: SecretSnapshot,
}

/// Parts rebuilt from a snapshot.
pub struct RestoredParts {
    /// Cities.
    pub cities: Cities,
    /// Cipher rebuilt from the stored secret.
    pub cipher: MatchCipher,
    /// Entities, unattached.
    pub entities: Vec<Arc<Entity>>,
}

impl MatchSnapshot {
    /// Read and parse the document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the document atomically: temp file, then rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = serde_json::to_string(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Validate and rebuild every part. Fails on the first bad element.
    pub fn restore(&self, directory: &PlayerDirectory) -> Result<RestoredParts, SnapshotError> {
        let cipher = MatchCipher::from_secret(self.password.secret.clone())?;
        let mut tokens = HashSet::new();
        let mut entities = Vec::with_capacity(self.map.len());
        for element in &self.map {
            if let Some(token) = element.token() {
                if !tokens.insert(token) {
                    return Err(SnapshotError::DuplicateToken(token.to_string()));
                }
            }
            entities.push(Arc::new(element.restore(directory)?));
        }
        Ok(RestoredParts { cities: self.cities.clone(), cipher, entities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::PlayerRecord;

    fn directory_with(id: Uuid) -> PlayerDirectory {
        let dir = PlayerDirectory::in_memory();
        dir.insert(PlayerRecord {
            id,
            alias: "ann".into(),
            password: "pw".into(),
            hot_effect: 0,
            cold_effect: 0,
        });
        dir
    }

    fn sample(id: Uuid) -> MatchSnapshot {
        MatchSnapshot {
            cities: Cities::default(),
            map: vec![
                ElementSnapshot::Food { position: Position::new(0, 0) },
                ElementSnapshot::Npc { position: Position::new(3, 3), level: 2, token: "npc-1".into() },
                ElementSnapshot::Player {
                    position: Position::new(4, 4),
                    level: 1,
                    token: "tok".into(),
                    player: id,
                    player_name: "ann".into(),
                },
            ],
            password: SecretSnapshot { secret: "s3cret".into() },
        }
    }

    #[test]
    fn test_document_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(sample(id)).unwrap();
        assert_eq!(json["cities"].as_array().unwrap().len(), 4);
        assert_eq!(json["map"][0]["type"], "food");
        assert_eq!(json["map"][1]["position"], serde_json::json!([3, 3]));
        assert_eq!(json["map"][2]["player-name"], "ann");
        assert_eq!(json["password"]["secret"], "s3cret");
    }

    #[test]
    fn test_save_load_restore() {
        let id = Uuid::new_v4();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("latestGame.json");
        sample(id).save(&path).unwrap();
        assert!(!tmp.path().join("latestGame.json.tmp").exists());

        let loaded = MatchSnapshot::load(&path).unwrap();
        assert_eq!(loaded, sample(id));
        let parts = loaded.restore(&directory_with(id)).unwrap();
        assert_eq!(parts.entities.len(), 3);
        assert_eq!(parts.cipher.secret(), "s3cret");
        assert_eq!(parts.entities[2].token(), Some("tok"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let text = r#"{"cities":[{"name":"a","temperature":1.0},{"name":"b","temperature":1.0},
            {"name":"c","temperature":1.0},{"name":"d","temperature":1.0}],
            "map":[{"type":"dragon","position":[1,1]}],"password":{"secret":"x"}}"#;
        assert!(matches!(serde_json::from_str::<MatchSnapshot>(text), Err(_)));
    }

    #[test]
    fn test_wrong_city_count_rejected() {
        let text = r#"{"cities":[{"name":"a","temperature":1.0}],"map":[],"password":{"secret":"x"}}"#;
        assert!(serde_json::from_str::<MatchSnapshot>(text).is_err());
    }

    #[test]
    fn test_restore_is_all_or_nothing() {
        let id = Uuid::new_v4();
        let dir = directory_with(id);

        let mut bad = sample(id);
        bad.map.push(ElementSnapshot::Mine { position: Position::new(20, 1) });
        assert!(matches!(bad.restore(&dir), Err(SnapshotError::OutOfBounds(_))));

        let mut bad = sample(id);
        bad.map.push(ElementSnapshot::Npc { position: Position::new(1, 1), level: 0, token: "n".into() });
        assert!(matches!(bad.restore(&dir), Err(SnapshotError::InvalidLevel { .. })));

        assert!(matches!(sample(Uuid::new_v4()).restore(&dir), Err(SnapshotError::UnknownPlayer(_))));

        let mut bad = sample(id);
        bad.map.push(ElementSnapshot::Npc { position: Position::new(9, 9), level: 1, token: "npc-1".into() });
        assert!(matches!(bad.restore(&dir), Err(SnapshotError::DuplicateToken(t)) if t == "npc-1"));

        let mut bad = sample(id);
        bad.password.secret.clear();
        assert!(matches!(bad.restore(&dir), Err(SnapshotError::Secret(_))));
    }
}
