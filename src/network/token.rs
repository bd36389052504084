//! Token Issuance
//!
//! Single-flight admission workflow. The engine asks for N tokens; the
//! service then authenticates incoming sessions against the player
//! directory and hands each player a token until N are out, or until the
//! operator finishes the request early.
//!
//! At most one request is active at any time. A second `request_tokens`
//! while one is active is rejected, not queued.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::network::protocol::{token_replies, Credentials};
use crate::network::server::{ServerConfig, ServerError, SessionServer};
use crate::network::session::SocketSession;
use crate::players::PlayerDirectory;

/// Tokens handed out by a request, keyed by token.
pub type TokenMap = HashMap<String, Uuid>;

/// Receives the final token map once a request completes.
pub trait TokenRequester: Send + Sync {
    /// Called exactly once per request.
    fn on_request_completed(&self, tokens: &TokenMap);
}

impl<F> TokenRequester for F
where
    F: Fn(&TokenMap) + Send + Sync,
{
    fn on_request_completed(&self, tokens: &TokenMap) {
        self(tokens)
    }
}

struct RequestInner {
    tokens: TokenMap,
    finished: bool,
}

/// An in-flight token request.
pub struct TokenRequest {
    target: usize,
    secret: String,
    inner: Mutex<RequestInner>,
    done: Notify,
    requester: Arc<dyn TokenRequester>,
}

impl TokenRequest {
    /// Number of tokens wanted.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Tokens still to hand out.
    pub fn remaining(&self) -> usize {
        let inner = self.lock();
        self.target.saturating_sub(inner.tokens.len())
    }

    /// Whether the request completed.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mint a token for `player`. Returns the token and whether the request
    /// just reached its target.
    fn create_token(&self, player: Uuid) -> Option<(String, bool)> {
        let mut inner = self.lock();
        if inner.finished || inner.tokens.len() >= self.target {
            return None;
        }
        let token = Uuid::new_v4().simple().to_string();
        inner.tokens.insert(token.clone(), player);
        Some((token, inner.tokens.len() == self.target))
    }

    /// Final token map, once finished.
    fn final_tokens(&self) -> Option<TokenMap> {
        let inner = self.lock();
        inner.finished.then(|| inner.tokens.clone())
    }
}

struct TokenState {
    directory: Arc<PlayerDirectory>,
    active: Mutex<Option<Arc<TokenRequest>>>,
}

impl TokenState {
    fn active(&self) -> Option<Arc<TokenRequest>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Complete `request` exactly once: clear the slot, wake waiters,
    /// notify the requester.
    fn finish(&self, request: &Arc<TokenRequest>) {
        let tokens = {
            let mut inner = request.lock();
            if inner.finished {
                return;
            }
            inner.finished = true;
            inner.tokens.clone()
        };
        {
            let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, request)) {
                *slot = None;
            }
        }
        info!("Token request finished with {}/{} tokens", tokens.len(), request.target);
        request.done.notify_waiters();
        request.requester.on_request_completed(&tokens);
    }
}

/// Handle to an accepted token request.
#[derive(Clone)]
pub struct TokenRequestHandle {
    request: Arc<TokenRequest>,
    state: Arc<TokenState>,
}

impl TokenRequestHandle {
    /// Wait for completion and return the final token map.
    pub async fn wait(&self) -> TokenMap {
        loop {
            let notified = self.request.done.notified();
            if let Some(tokens) = self.request.final_tokens() {
                return tokens;
            }
            notified.await;
        }
    }

    /// Complete the request now with whatever tokens were handed out.
    pub fn finish_early(&self) {
        self.state.finish(&self.request);
    }

    /// Underlying request.
    pub fn request(&self) -> &TokenRequest {
        &self.request
    }
}

/// Listening service that issues admission tokens.
pub struct TokenService {
    server: SessionServer,
    state: Arc<TokenState>,
}

impl TokenService {
    /// Bind the listener.
    pub async fn bind(config: ServerConfig, directory: Arc<PlayerDirectory>) -> Result<Self, ServerError> {
        let server = SessionServer::bind("Token service", config).await?;
        Ok(Self {
            server,
            state: Arc::new(TokenState { directory, active: Mutex::new(None) }),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.server.local_addr()
    }

    /// Start a request for `count` tokens. Returns `None` if one is
    /// already active.
    pub fn request_tokens(
        &self,
        count: usize,
        secret: impl Into<String>,
        requester: Arc<dyn TokenRequester>,
    ) -> Option<TokenRequestHandle> {
        let mut slot = self.state.active.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            warn!("Token request rejected: another request is active");
            return None;
        }
        let request = Arc::new(TokenRequest {
            target: count,
            secret: secret.into(),
            inner: Mutex::new(RequestInner { tokens: HashMap::new(), finished: false }),
            done: Notify::new(),
            requester,
        });
        *slot = Some(request.clone());
        info!("Serving {} tokens", count);
        Some(TokenRequestHandle { request, state: self.state.clone() })
    }

    /// Whether a request is currently active.
    pub fn is_serving(&self) -> bool {
        self.state.active().is_some()
    }

    /// Serve sessions until [`TokenService::shutdown`].
    pub async fn run(&self) -> Result<(), ServerError> {
        let state = self.state.clone();
        self.server
            .serve(move |session| handle_client(state.clone(), session))
            .await
    }

    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

async fn handle_client(state: Arc<TokenState>, mut session: SocketSession<TcpStream>) {
    if session.enquire().await.is_err() {
        return;
    }

    // Credentials follow the handshake unprompted and are read before any reply.
    let credentials = loop {
        let Ok(text) = session.read_string().await else {
            return;
        };
        if let Some(credentials) = Credentials::parse(&text) {
            break credentials;
        }
        debug!("Malformed credentials from {}", session.peer());
        if session.send_nack().await.is_err() || session.decrement_attempt().await == 0 {
            return;
        }
    };

    let Some(request) = state.active() else {
        reply(&mut session, token_replies::NOT_SERVING_TOKENS).await;
        return;
    };
    if request.remaining() == 0 {
        reply(&mut session, token_replies::NOT_SERVING_TOKENS).await;
        state.finish(&request);
        return;
    }

    let Some(player) = state.directory.by_alias(&credentials.alias) else {
        reply(&mut session, token_replies::UNKNOWN_USER).await;
        return;
    };
    if !player.password_matches(&credentials.password) {
        reply(&mut session, token_replies::INCORRECT_PASSWORD).await;
        return;
    }

    if state.directory.by_id(&player.id).is_none() {
        error!("Player {} vanished from the directory during token creation", player.id);
        reply(&mut session, token_replies::UNKNOWN_USER).await;
        return;
    }
    let Some((token, reached_target)) = request.create_token(player.id) else {
        reply(&mut session, token_replies::NOT_SERVING_TOKENS).await;
        return;
    };
    info!("Issued token to {}", player.alias);
    reply(&mut session, &format!("{}:{}", request.secret, token)).await;

    if reached_target {
        state.finish(&request);
    }
}

async fn reply(session: &mut SocketSession<TcpStream>, text: &str) {
    if session.send_string(text).await.is_ok() {
        session.end_session().await;
    }
}
