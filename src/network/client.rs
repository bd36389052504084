//! Initiator-side helpers for the token and account services.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::debug;

use crate::core::crypto::hash_password;
use crate::network::protocol::{account_replies, token_replies, AccountRequest, Credentials};
use crate::network::session::{SessionConfig, SessionError, SocketSession};
use crate::players::PlayerDraft;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not connect.
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    /// Session failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Alias not registered.
    #[error("unknown user")]
    UnknownUser,

    /// Wrong password.
    #[error("incorrect password")]
    IncorrectPassword,

    /// No match is admitting players.
    #[error("not serving tokens")]
    NotServingTokens,

    /// The account service refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Reply did not match any known form.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Admission data returned by the token service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTicket {
    /// Match secret, used to decrypt map broadcasts.
    pub secret: String,
    /// Token to put on movement and keep-alive messages.
    pub token: String,
}

/// Ask the token service at `addr` to admit `alias`.
pub async fn join_match(
    addr: SocketAddr,
    alias: &str,
    password: &str,
    config: SessionConfig,
) -> Result<JoinTicket, ClientError> {
    let credentials = Credentials { alias: alias.to_string(), password: hash_password(password) };
    let reply = exchange(addr, &credentials.encode(), config).await?;

    match reply.as_str() {
        token_replies::UNKNOWN_USER => Err(ClientError::UnknownUser),
        token_replies::INCORRECT_PASSWORD => Err(ClientError::IncorrectPassword),
        token_replies::NOT_SERVING_TOKENS => Err(ClientError::NotServingTokens),
        _ => match reply.split_once(':') {
            Some((secret, token)) => Ok(JoinTicket { secret: secret.to_string(), token: token.to_string() }),
            None => Err(ClientError::Malformed(reply)),
        },
    }
}

/// Register a new account.
pub async fn create_account(
    addr: SocketAddr,
    alias: &str,
    password: &str,
    hot_effect: i32,
    cold_effect: i32,
    config: SessionConfig,
) -> Result<(), ClientError> {
    let request = AccountRequest::Create(PlayerDraft {
        alias: alias.to_string(),
        password: hash_password(password),
        hot_effect,
        cold_effect,
    });
    account_exchange(addr, &request, config).await
}

/// Edit an existing account.
#[allow(clippy::too_many_arguments)]
pub async fn edit_account(
    addr: SocketAddr,
    old_alias: &str,
    old_password: &str,
    new_alias: &str,
    new_password: &str,
    hot_effect: i32,
    cold_effect: i32,
    config: SessionConfig,
) -> Result<(), ClientError> {
    let request = AccountRequest::Edit {
        old_alias: old_alias.to_string(),
        old_password: hash_password(old_password),
        draft: PlayerDraft {
            alias: new_alias.to_string(),
            password: hash_password(new_password),
            hot_effect,
            cold_effect,
        },
    };
    account_exchange(addr, &request, config).await
}

async fn account_exchange(
    addr: SocketAddr,
    request: &AccountRequest,
    config: SessionConfig,
) -> Result<(), ClientError> {
    let reply = exchange(addr, &request.encode(), config).await?;
    if reply == account_replies::SUCCESS {
        Ok(())
    } else {
        Err(ClientError::Rejected(reply))
    }
}

/// One request/reply over a fresh session.
async fn exchange(addr: SocketAddr, request: &str, config: SessionConfig) -> Result<String, ClientError> {
    let stream = TcpStream::connect(addr).await?;
    let mut session = SocketSession::initiator(stream, addr, config);
    session.enquire().await?;
    session.send_string(request).await?;
    let reply = session.read_string().await?;
    session.end_session().await;
    debug!("Received {}-character reply from {}", reply.chars().count(), addr);
    Ok(reply)
}
