//! Account Service
//!
//! Create and edit player accounts over the session protocol. One request
//! per session; the reply is a status code and the session then ends.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::network::protocol::{account_replies, AccountRequest};
use crate::network::server::{ServerConfig, ServerError, SessionServer};
use crate::network::session::SocketSession;
use crate::players::PlayerDirectory;

/// Listening service for account operations.
pub struct AccountService {
    server: SessionServer,
    directory: Arc<PlayerDirectory>,
}

impl AccountService {
    /// Bind the listener.
    pub async fn bind(config: ServerConfig, directory: Arc<PlayerDirectory>) -> Result<Self, ServerError> {
        let server = SessionServer::bind("Account service", config).await?;
        Ok(Self { server, directory })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.server.local_addr()
    }

    /// Serve sessions until [`AccountService::shutdown`].
    pub async fn run(&self) -> Result<(), ServerError> {
        let directory = self.directory.clone();
        self.server
            .serve(move |session| handle_client(directory.clone(), session))
            .await
    }

    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

/// Apply one request to the directory and produce the reply.
pub fn apply(directory: &PlayerDirectory, text: &str) -> String {
    let request = match AccountRequest::parse(text) {
        Ok(request) => request,
        Err(reply) => return reply.to_string(),
    };
    let result = match request {
        AccountRequest::Create(draft) => directory.create(draft),
        AccountRequest::Edit { old_alias, old_password, draft } => {
            directory.edit(&old_alias, &old_password, draft)
        }
    };
    match result {
        Ok(record) => {
            info!("Account {} saved", record.alias);
            account_replies::SUCCESS.to_string()
        }
        Err(e) => {
            warn!("Account request rejected: {}", e);
            format!("{}{}", account_replies::ERROR_PREFIX, e.code())
        }
    }
}

async fn handle_client(directory: Arc<PlayerDirectory>, mut session: SocketSession<TcpStream>) {
    if session.enquire().await.is_err() {
        return;
    }
    let Ok(text) = session.read_string().await else {
        return;
    };
    let reply = apply(&directory, &text);
    if session.send_string(&reply).await.is_ok() {
        session.end_session().await;
    }
}
