//! Session Message Formats
//!
//! Plain-text requests and replies carried inside framed strings by the
//! token and account services.

use crate::players::PlayerDraft;

/// Token service replies.
pub mod token_replies {
    /// No request is active, or it already filled up.
    pub const NOT_SERVING_TOKENS: &str = "NOT_SERVING_TOKENS";
    /// Alias not registered.
    pub const UNKNOWN_USER: &str = "UNKNOWN_USER";
    /// Password digest mismatch.
    pub const INCORRECT_PASSWORD: &str = "INCORRECT_PASSWORD";
}

/// Account service replies.
pub mod account_replies {
    /// Operation applied.
    pub const SUCCESS: &str = "SUCCESS";
    /// Unknown verb.
    pub const INVALID_INFO: &str = "INVALID_INFO";
    /// Wrong field count.
    pub const NOT_ENOUGH_ARGS: &str = "INVALID_INFO:NOT_ENOUGH_ARGS";
    /// Hot effect is not an integer.
    pub const INVALID_HE: &str = "INVALID_INFO:INVALID_HE";
    /// Cold effect is not an integer.
    pub const INVALID_CE: &str = "INVALID_INFO:INVALID_CE";
    /// Prefix for directory failures, followed by the error code.
    pub const ERROR_PREFIX: &str = "ERROR:";
}

/// `alias:password` sent to the token service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Player alias.
    pub alias: String,
    /// Password digest.
    pub password: String,
}

impl Credentials {
    /// Parse `alias:password`. Both fields must be present and non-empty.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(':');
        let (alias, password) = (parts.next()?, parts.next()?);
        if parts.next().is_some() || alias.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { alias: alias.to_string(), password: password.to_string() })
    }

    /// Wire form.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.alias, self.password)
    }
}

/// Account service request.
#[derive(Debug, Clone)]
pub enum AccountRequest {
    /// `create:alias:password:hotEffect:coldEffect`
    Create(PlayerDraft),
    /// `edit:oldAlias:oldPassword:newAlias:newPassword:hotEffect:coldEffect`
    Edit {
        /// Alias being edited.
        old_alias: String,
        /// Current password digest.
        old_password: String,
        /// Replacement fields.
        draft: PlayerDraft,
    },
}

impl AccountRequest {
    /// Parse a request, or return the rejection reply.
    pub fn parse(text: &str) -> Result<Self, &'static str> {
        let parts: Vec<&str> = text.split(':').collect();
        match parts[0] {
            "create" => {
                let [_, alias, password, he, ce] = parts[..] else {
                    return Err(account_replies::NOT_ENOUGH_ARGS);
                };
                Ok(Self::Create(draft(alias, password, he, ce)?))
            }
            "edit" => {
                let [_, old_alias, old_password, alias, password, he, ce] = parts[..] else {
                    return Err(account_replies::NOT_ENOUGH_ARGS);
                };
                Ok(Self::Edit {
                    old_alias: old_alias.to_string(),
                    old_password: old_password.to_string(),
                    draft: draft(alias, password, he, ce)?,
                })
            }
            _ => Err(account_replies::INVALID_INFO),
        }
    }

    /// Wire form.
    pub fn encode(&self) -> String {
        match self {
            Self::Create(d) => {
                format!("create:{}:{}:{}:{}", d.alias, d.password, d.hot_effect, d.cold_effect)
            }
            Self::Edit { old_alias, old_password, draft: d } => format!(
                "edit:{}:{}:{}:{}:{}:{}",
                old_alias, old_password, d.alias, d.password, d.hot_effect, d.cold_effect
            ),
        }
    }
}

fn draft(alias: &str, password: &str, he: &str, ce: &str) -> Result<PlayerDraft, &'static str> {
    let hot_effect = he.trim().parse().map_err(|_| account_replies::INVALID_HE)?;
    let cold_effect = ce.trim().parse().map_err(|_| account_replies::INVALID_CE)?;
    Ok(PlayerDraft {
        alias: alias.to_string(),
        password: password.to_string(),
        hot_effect,
        cold_effect,
    })
}
