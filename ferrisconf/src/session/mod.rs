//! Session lifecycle for a single device.
//!
//! The session layer owns the connect / login / send / execute / close
//! lifecycle and the state machine behind it:
//!
//! ```text
//! Unconnected --connect--> Authenticated
//!      |                        ^
//!      | connect (auth rejected) | login
//!      v                        |
//! ConnectedUnauthenticated -----+
//!
//! Authenticated --close--> Closed
//! ```

mod adapter;
mod builder;
mod dispatch;

pub use adapter::SessionAdapter;
pub use builder::SessionBuilder;
pub use dispatch::{ResponseDispatcher, Subscriber};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::account::Account;
use crate::error::Result;

/// Status code returned by [`Protocol::execute`] on success.
///
/// Other protocols may report device-level codes here; callers should not
/// assume every adapter returns zero.
pub const EXECUTE_SUCCESS: i32 = 0;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt has succeeded yet.
    Unconnected,

    /// The device is reachable but no credentials have been accepted.
    ConnectedUnauthenticated,

    /// A live, authenticated session is held.
    Authenticated,

    /// The session was closed. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::ConnectedUnauthenticated => "connected but unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Uniform lifecycle for device protocol adapters.
pub trait Protocol: Send {
    /// Connect to the device.
    ///
    /// `port` defaults to the protocol's standard port. Rejected credentials
    /// do not fail the call; the session is left unauthenticated so that
    /// [`login`](Self::login) can be tried later.
    fn connect(
        &mut self,
        host: &str,
        port: Option<u16>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Authenticate with `account`.
    ///
    /// Does nothing if a live session is already held. Rejected credentials
    /// are reported to the caller.
    fn login(&mut self, account: Arc<Account>) -> impl Future<Output = Result<()>> + Send;

    /// Send a request and discard the response.
    ///
    /// Subscribers are still notified.
    fn send(&mut self, payload: &str) -> impl Future<Output = Result<()>> + Send;

    /// Send a request and return `(status_code, response)`.
    fn execute(&mut self, command: &str) -> impl Future<Output = Result<(i32, String)>> + Send;

    /// Close the session. With `force`, skip the graceful goodbye.
    fn close(&mut self, force: bool) -> impl Future<Output = Result<()>> + Send;

    /// Whether a live, authenticated session is held.
    fn is_authenticated(&self) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;
}
