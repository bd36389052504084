//! Player Directory
//!
//! Player records persisted as one JSON file per player, indexed by id and
//! by alias for concurrent lookup from session workers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::city::Climate;

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Stable identifier.
    pub id: Uuid,
    /// Unique display alias.
    pub alias: String,
    /// Password digest as produced by the client.
    pub password: String,
    /// Level modifier in hot cities.
    #[serde(rename = "hot-effect")]
    pub hot_effect: i32,
    /// Level modifier in cold cities.
    #[serde(rename = "cold-effect")]
    pub cold_effect: i32,
}

impl PlayerRecord {
    /// Level modifier for the given climate.
    pub fn climate_modifier(&self, climate: Climate) -> i32 {
        match climate {
            Climate::Cold => self.cold_effect,
            Climate::Hot => self.hot_effect,
            Climate::Mild => 0,
        }
    }

    /// Compare a client-supplied digest.
    pub fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }
}

/// Directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The players folder could not be read.
    #[error("could not read players folder {path}: {source}")]
    Load {
        /// Folder path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// No player with that alias.
    #[error("no such user")]
    NoUser,

    /// Password digest mismatch.
    #[error("invalid password")]
    InvalidPassword,

    /// Alias taken by another player.
    #[error("alias already in use")]
    AliasInUse,

    /// Alias empty or containing the field separator.
    #[error("invalid alias")]
    InvalidAlias,

    /// The record could not be written.
    #[error("could not save player: {0}")]
    CanNotSave(#[source] std::io::Error),
}

impl DirectoryError {
    /// Reply code used by the account service.
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::Load { .. } | DirectoryError::CanNotSave(_) => "CAN_NOT_SAVE",
            DirectoryError::NoUser => "NO_USER",
            DirectoryError::InvalidPassword => "INVALID_PASSWORD",
            DirectoryError::AliasInUse => "ALIAS_IN_USE",
            DirectoryError::InvalidAlias => "INVALID_ALIAS",
        }
    }
}

/// Fields of a create or edit request.
#[derive(Debug, Clone)]
pub struct PlayerDraft {
    /// Alias to register.
    pub alias: String,
    /// Password digest.
    pub password: String,
    /// Hot climate modifier.
    pub hot_effect: i32,
    /// Cold climate modifier.
    pub cold_effect: i32,
}

/// Concurrent player directory.
pub struct PlayerDirectory {
    folder: Option<PathBuf>,
    by_id: DashMap<Uuid, Arc<PlayerRecord>>,
    aliases: DashMap<String, Uuid>,
    /// Serializes create/edit so alias checks and index updates stay consistent.
    writes: Mutex<()>,
}

impl PlayerDirectory {
    /// Directory with no backing folder.
    pub fn in_memory() -> Self {
        Self {
            folder: None,
            by_id: DashMap::new(),
            aliases: DashMap::new(),
            writes: Mutex::new(()),
        }
    }

    /// Load every `*.json` record in `folder`, creating it if missing.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let folder = folder.as_ref().to_path_buf();
        let load_err = |source| DirectoryError::Load { path: folder.clone(), source };

        std::fs::create_dir_all(&folder).map_err(load_err)?;
        let mut directory = Self::in_memory();

        for entry in std::fs::read_dir(&folder).map_err(load_err)? {
            let path = entry.map_err(load_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => {
                    directory.index(record);
                }
                Err(e) => warn!("Skipping unreadable player file {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} players from {}", directory.len(), folder.display());
        directory.folder = Some(folder);
        Ok(directory)
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no players are registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look a player up by alias.
    pub fn by_alias(&self, alias: &str) -> Option<Arc<PlayerRecord>> {
        let id = *self.aliases.get(alias)?;
        self.by_id(&id)
    }

    /// Look a player up by id.
    pub fn by_id(&self, id: &Uuid) -> Option<Arc<PlayerRecord>> {
        self.by_id.get(id).map(|r| r.value().clone())
    }

    /// Add a record to the in-memory indices without persisting it.
    pub fn insert(&self, record: PlayerRecord) -> Arc<PlayerRecord> {
        self.index(record)
    }

    /// Register a new player.
    pub fn create(&self, draft: PlayerDraft) -> Result<Arc<PlayerRecord>, DirectoryError> {
        validate_alias(&draft.alias)?;
        let _guard = self.writes.lock().unwrap_or_else(|e| e.into_inner());

        if self.aliases.contains_key(&draft.alias) {
            return Err(DirectoryError::AliasInUse);
        }
        let record = PlayerRecord {
            id: Uuid::new_v4(),
            alias: draft.alias,
            password: draft.password,
            hot_effect: draft.hot_effect,
            cold_effect: draft.cold_effect,
        };
        self.persist(&record)?;
        info!("Registered player {} ({})", record.alias, record.id);
        Ok(self.index(record))
    }

    /// Change an existing player's alias, password and modifiers.
    pub fn edit(
        &self,
        old_alias: &str,
        old_password: &str,
        draft: PlayerDraft,
    ) -> Result<Arc<PlayerRecord>, DirectoryError> {
        validate_alias(&draft.alias)?;
        let _guard = self.writes.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.by_alias(old_alias).ok_or(DirectoryError::NoUser)?;
        if !current.password_matches(old_password) {
            return Err(DirectoryError::InvalidPassword);
        }
        if draft.alias != current.alias {
            if let Some(owner) = self.aliases.get(&draft.alias) {
                if *owner != current.id {
                    return Err(DirectoryError::AliasInUse);
                }
            }
        }

        let record = PlayerRecord {
            id: current.id,
            alias: draft.alias,
            password: draft.password,
            hot_effect: draft.hot_effect,
            cold_effect: draft.cold_effect,
        };
        self.persist(&record)?;
        self.aliases.remove(&current.alias);
        debug!("Player {} renamed to {}", current.alias, record.alias);
        Ok(self.index(record))
    }

    fn index(&self, record: PlayerRecord) -> Arc<PlayerRecord> {
        let record = Arc::new(record);
        self.aliases.insert(record.alias.clone(), record.id);
        self.by_id.insert(record.id, record.clone());
        record
    }

    fn persist(&self, record: &PlayerRecord) -> Result<(), DirectoryError> {
        let Some(folder) = &self.folder else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| DirectoryError::CanNotSave(e.into()))?;
        std::fs::write(folder.join(format!("{}.json", record.id)), json)
            .map_err(DirectoryError::CanNotSave)
    }
}

fn read_record(path: &Path) -> std::io::Result<PlayerRecord> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn validate_alias(alias: &str) -> Result<(), DirectoryError> {
    if alias.trim().is_empty() || alias.contains(':') {
        return Err(DirectoryError::InvalidAlias);
    }
    Ok(())
}
