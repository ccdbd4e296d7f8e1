//! Error types for ferrisconf.

use std::io;
use thiserror::Error;

use crate::session::SessionState;

/// Main error type for ferrisconf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (network, SSH, NETCONF framing, authentication)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Account pool errors
    #[error("Account error: {0}")]
    Account(#[from] AccountError),
}

impl Error {
    /// Whether this error is the remote side rejecting the credentials.
    ///
    /// This is the one failure the session adapter tolerates during
    /// `connect`; everything else is fatal to the operation.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        )
    }

    /// Whether this error was raised because an operation was attempted in
    /// the wrong session state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::Session(SessionError::InvalidState { .. }))
    }
}

/// Transport layer errors (SSH connection, authentication, NETCONF framing).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts (strict verification)
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key does not match the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Malformed NETCONF message framing
    #[error("Framing error: {message}")]
    Framing { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session layer errors (lifecycle ordering, request validation).
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation not allowed in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Request payload was empty
    #[error("Request payload is empty")]
    EmptyPayload,

    /// Pool-managed login requested without an account manager
    #[error("No account manager attached to this session")]
    NoAccountManager,
}

/// Account pool errors.
#[derive(Error, Debug)]
pub enum AccountError {
    /// No account with this name is managed by the pool
    #[error("Unknown account '{name}'")]
    UnknownAccount { name: String },

    /// An account with this name is already in the pool
    #[error("Account '{name}' already registered")]
    AlreadyRegistered { name: String },

    /// Release of an account that is not currently held
    #[error("Account '{name}' is not locked")]
    NotLocked { name: String },

    /// Accounts used for authentication need a name
    #[error("Account name must not be empty")]
    EmptyName,

    /// The pool has no accounts to hand out
    #[error("Account pool is empty")]
    EmptyPool,

    /// The pool was closed while waiting for an account
    #[error("Account pool closed")]
    PoolClosed,
}

/// Result type alias using ferrisconf's Error.
pub type Result<T> = std::result::Result<T, Error>;
