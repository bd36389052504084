//! Network Layer
//!
//! The point-to-point session protocol and the services built on it:
//! token issuance for match admission and account operations.
//!
//! - `framing`: checksummed frames over control-character primitives
//! - `session`: handshake, string exchange and termination
//! - `server`: shared accept loop with a bounded worker pool
//! - `token`: single-flight token issuance
//! - `accounts`: account create/edit
//! - `client`: initiator-side helpers

pub mod accounts;
pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod session;
pub mod token;

pub use accounts::AccountService;
pub use client::{join_match, ClientError, JoinTicket};
pub use framing::{FrameError, PrimitiveError};
pub use server::{ServerConfig, ServerError, SessionServer};
pub use session::{Role, SessionConfig, SessionError, SessionState, SocketSession};
pub use token::{TokenMap, TokenRequestHandle, TokenRequester, TokenService};
