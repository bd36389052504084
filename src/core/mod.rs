//! Core primitives.
//!
//! Grid coordinates, city quadrants and the crypto capabilities shared by
//! the session services and the match engine.

pub mod city;
pub mod crypto;
pub mod position;

// Re-export core types
pub use city::{Cities, City, Climate};
pub use crypto::{hash_password, random_secret, CipherError, MatchCipher};
pub use position::Position;
