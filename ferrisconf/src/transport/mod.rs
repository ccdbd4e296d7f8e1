//! Transport layer: the pluggable wire capability the session adapter drives.
//!
//! A [`Transport`] performs the handshake, authenticates with the
//! [`Credentials`] it is given, exchanges RPCs and tears the session down.
//! [`SshTransport`] speaks NETCONF over SSH using russh; any other
//! implementation can be plugged into a [`SessionAdapter`](crate::SessionAdapter).

pub mod config;
pub mod framing;
mod reply;
mod ssh;
#[cfg(test)]
pub(crate) mod stub;

use std::future::Future;

pub use config::{HostKeyVerification, SshConfig};
pub use framing::{FrameDecoder, Framing};
pub use reply::{Reply, Request, RpcReply};
pub use ssh::{NetconfSession, SshTransport};

use crate::account::Credentials;
use crate::error::Result;

/// Default NETCONF-over-SSH port.
pub const DEFAULT_PORT: u16 = 830;

/// Trait for transports a session adapter can run over.
///
/// Implementations must report rejected credentials as
/// [`TransportError::AuthenticationFailed`](crate::error::TransportError::AuthenticationFailed)
/// and every other connection failure as a different transport error; the
/// adapter's authentication-fallback policy depends on the distinction.
pub trait Transport: Send + Sync {
    /// Live session handle, exclusively owned by one adapter.
    type Session: Send;

    /// Connect to `host:port` and authenticate.
    fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: Credentials<'_>,
    ) -> impl Future<Output = Result<Self::Session>> + Send;

    /// Send one request and wait for its reply.
    fn dispatch_rpc(
        &self,
        session: &mut Self::Session,
        request: &Request,
    ) -> impl Future<Output = Result<Reply>> + Send;

    /// Tear the session down. With `force`, skip any graceful goodbye.
    fn close_session(
        &self,
        session: Self::Session,
        force: bool,
    ) -> impl Future<Output = Result<()>> + Send;
}
