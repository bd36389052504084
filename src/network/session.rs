//! Session Protocol
//!
//! Stateful wrapper around one connection. A session opens with an
//! enquiry handshake, exchanges checksummed frames, and closes with `EOT`.
//!
//! ```text
//! Waiting --enquire()--> Enquired --end_session()--> Finished
//! ```
//!
//! All attempts spent inside a session (handshake retries, NACKed frames,
//! ad-hoc re-prompts) draw from one shared budget.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::network::framing::{
    self, read_control_char, write_control_char, FrameError, PrimitiveError, ACK, ENQ, EOT, NACK,
};

/// A byte stream a session can run over.
pub trait SessionTransport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Half-close the read side of the connection.
    fn shutdown_read(&mut self) -> std::io::Result<()>;
}

impl SessionTransport for TcpStream {
    fn shutdown_read(&mut self) -> std::io::Result<()> {
        socket2::SockRef::from(&*self).shutdown(std::net::Shutdown::Read)
    }
}

impl SessionTransport for DuplexStream {
    fn shutdown_read(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client side: sends `ENQ`.
    Initiator,
    /// Server side: answers `ENQ` with `ACK`.
    Responder,
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, handshake not done.
    Waiting,
    /// Handshake done, frames may flow.
    Enquired,
    /// Terminal.
    Finished,
}

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Shared attempt budget for the whole session.
    pub attempts: u32,
    /// Timeout for each individual read.
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            read_timeout: Duration::from_millis(1000),
        }
    }
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operation requires a completed handshake.
    #[error("session not enquired")]
    NotEnquired,

    /// Handshake was already performed.
    #[error("session already enquired")]
    AlreadyEnquired,

    /// Session was already closed.
    #[error("session finished")]
    Finished,

    /// A read timed out.
    #[error("read timed out")]
    TimedOut,

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// The attempt budget reached zero.
    #[error("out of attempts")]
    OutOfAttempts,

    /// Peer ended the session with EOT.
    #[error("peer ended the session")]
    ReceivedEot,

    /// Peer sent an oversized frame.
    #[error("frame too long")]
    FrameTooLong,
}

impl From<FrameError> for SessionError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::TimedOut => SessionError::TimedOut,
            FrameError::Io(e) => SessionError::Io(e),
            FrameError::OutOfAttempts => SessionError::OutOfAttempts,
            FrameError::ReceivedEot => SessionError::ReceivedEot,
            FrameError::TooLong => SessionError::FrameTooLong,
        }
    }
}

impl From<PrimitiveError> for SessionError {
    fn from(e: PrimitiveError) -> Self {
        FrameError::from(e).into()
    }
}

/// One session over one connection.
pub struct SocketSession<S: SessionTransport> {
    stream: Option<S>,
    role: Role,
    state: SessionState,
    attempts: u32,
    read_timeout: Duration,
    peer: String,
}

impl<S: SessionTransport> SocketSession<S> {
    /// Server side of a freshly accepted connection.
    pub fn responder(stream: S, peer: impl fmt::Display, config: SessionConfig) -> Self {
        Self::new(stream, Role::Responder, peer, config)
    }

    /// Client side of a freshly opened connection.
    pub fn initiator(stream: S, peer: impl fmt::Display, config: SessionConfig) -> Self {
        Self::new(stream, Role::Initiator, peer, config)
    }

    fn new(stream: S, role: Role, peer: impl fmt::Display, config: SessionConfig) -> Self {
        Self {
            stream: Some(stream),
            role,
            state: SessionState::Waiting,
            attempts: config.attempts,
            read_timeout: config.read_timeout,
            peer: peer.to_string(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handshake role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Attempts left in the shared budget.
    pub fn remaining_attempts(&self) -> u32 {
        self.attempts
    }

    /// Peer label used in logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Perform the handshake for this session's role.
    pub async fn enquire(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Waiting => {}
            SessionState::Enquired => return Err(SessionError::AlreadyEnquired),
            SessionState::Finished => return Err(SessionError::Finished),
        }

        let result = match self.role {
            Role::Responder => self.enquire_as_responder().await,
            Role::Initiator => self.enquire_as_initiator().await,
        };

        match result {
            Ok(()) => {
                self.state = SessionState::Enquired;
                debug!("Session with {} enquired", self.peer);
                Ok(())
            }
            Err(e) => {
                warn!("Handshake with {} failed: {}", self.peer, e);
                self.abandon();
                Err(e)
            }
        }
    }

    async fn enquire_as_responder(&mut self) -> Result<(), SessionError> {
        let timeout = self.read_timeout;
        loop {
            let stream = self.stream.as_mut().ok_or(SessionError::Finished)?;
            if read_control_char(stream, timeout).await? == ENQ {
                write_control_char(stream, ACK).await?;
                return Ok(());
            }
            write_control_char(stream, NACK).await?;
            if self.spend_attempt() {
                return Err(SessionError::OutOfAttempts);
            }
        }
    }

    async fn enquire_as_initiator(&mut self) -> Result<(), SessionError> {
        let timeout = self.read_timeout;
        loop {
            let stream = self.stream.as_mut().ok_or(SessionError::Finished)?;
            write_control_char(stream, ENQ).await?;
            if read_control_char(stream, timeout).await? == ACK {
                return Ok(());
            }
            if self.spend_attempt() {
                return Err(SessionError::OutOfAttempts);
            }
        }
    }

    /// Send one framed string. Ends the session on failure.
    pub async fn send_string(&mut self, payload: &str) -> Result<(), SessionError> {
        let timeout = self.read_timeout;
        let mut attempts = self.attempts;
        let stream = self.enquired_stream()?;
        let result = framing::send_framed_string(stream, payload, &mut attempts, timeout).await;
        self.attempts = attempts;
        self.settle(result.map_err(SessionError::from), "send").await
    }

    /// Read one framed string. Ends the session on failure.
    pub async fn read_string(&mut self) -> Result<String, SessionError> {
        let timeout = self.read_timeout;
        let mut attempts = self.attempts;
        let stream = self.enquired_stream()?;
        let result = framing::receive_framed_string(stream, &mut attempts, timeout).await;
        self.attempts = attempts;
        self.settle(result.map_err(SessionError::from), "read").await
    }

    /// Send a bare `NACK`, used to re-prompt after a malformed request.
    pub async fn send_nack(&mut self) -> Result<(), SessionError> {
        let stream = self.enquired_stream()?;
        let result = write_control_char(stream, NACK).await;
        self.settle(result.map_err(SessionError::from), "NACK").await
    }

    /// Spend one attempt. Ends the session when the budget hits zero.
    ///
    /// Returns the attempts left.
    pub async fn decrement_attempt(&mut self) -> u32 {
        if self.spend_attempt() {
            debug!("Session with {} ran out of attempts", self.peer);
            self.end_session().await;
        }
        self.attempts
    }

    /// Close the session: `EOT`, half-close read, half-close write, drop.
    ///
    /// Every step is best-effort. No-op unless the session is enquired.
    pub async fn end_session(&mut self) {
        if self.state != SessionState::Enquired {
            return;
        }
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = write_control_char(&mut stream, EOT).await {
                warn!("Could not send EOT to {}: {}", self.peer, e);
            }
            if let Err(e) = stream.shutdown_read() {
                debug!("Input shutdown for {} failed: {}", self.peer, e);
            }
            if let Err(e) = stream.shutdown().await {
                debug!("Output shutdown for {} failed: {}", self.peer, e);
            }
        }
        self.state = SessionState::Finished;
        info!("Session with {} closed", self.peer);
    }

    /// Whether the session reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    fn enquired_stream(&mut self) -> Result<&mut S, SessionError> {
        if self.state != SessionState::Enquired {
            return Err(SessionError::NotEnquired);
        }
        self.stream.as_mut().ok_or(SessionError::Finished)
    }

    fn spend_attempt(&mut self) -> bool {
        self.attempts = self.attempts.saturating_sub(1);
        self.attempts == 0
    }

    async fn settle<T>(&mut self, result: Result<T, SessionError>, op: &str) -> Result<T, SessionError> {
        if let Err(e) = &result {
            match e {
                SessionError::ReceivedEot => debug!("{} ended the session during {}", self.peer, op),
                _ => warn!("Session {} with {} failed: {}", op, self.peer, e),
            }
            self.end_session().await;
        }
        result
    }

    /// Drop the connection without the EOT courtesy, used when the
    /// handshake never completed.
    fn abandon(&mut self) {
        self.stream = None;
        self.state = SessionState::Finished;
    }
}
