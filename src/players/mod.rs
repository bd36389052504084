//! Player Records
//!
//! Registered players and the directory the session services and the
//! snapshot loader resolve them from.

pub mod directory;

pub use directory::{DirectoryError, PlayerDirectory, PlayerDraft, PlayerRecord};
