//! Session adapter: the per-device connection and authentication state machine.

use std::sync::Arc;

use log::{debug, warn};

use super::dispatch::ResponseDispatcher;
use super::{EXECUTE_SUCCESS, Protocol, SessionState};
use crate::account::{Account, AccountGuard, AccountManager, Credentials};
use crate::error::{Error, Result, SessionError};
use crate::transport::{DEFAULT_PORT, SshTransport, Transport};

/// Session with a single device over any [`Transport`].
///
/// The adapter owns the transport session exclusively. It tolerates rejected
/// credentials during [`connect`](Protocol::connect) so the caller can
/// [`login`](Protocol::login) later, possibly with an account taken from a
/// shared [`AccountManager`].
pub struct SessionAdapter<T: Transport = SshTransport> {
    /// Transport used for every handshake and RPC.
    transport: T,

    /// Target host.
    host: String,

    /// Target port.
    port: u16,

    /// Live transport session (None until authenticated, and after close).
    handle: Option<T::Session>,

    /// Account used for the last authentication attempt.
    account: Option<Arc<Account>>,

    /// Lifecycle state.
    state: SessionState,

    /// Request dispatch and subscriber notification.
    dispatcher: ResponseDispatcher,

    /// Pool for [`login_with_manager`](Self::login_with_manager).
    account_manager: Option<Arc<AccountManager>>,

    /// Pool account held for the lifetime of the session.
    managed_account: Option<AccountGuard>,
}

impl<T: Transport> SessionAdapter<T> {
    /// Create an unconnected session over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            host: String::new(),
            port: DEFAULT_PORT,
            handle: None,
            account: None,
            state: SessionState::Unconnected,
            dispatcher: ResponseDispatcher::new(),
            account_manager: None,
            managed_account: None,
        }
    }

    pub(crate) fn set_target(&mut self, host: String, port: u16) {
        self.host = host;
        self.port = port;
    }

    /// Attach the account used by the next `connect`.
    pub fn set_account(&mut self, account: Arc<Account>) {
        self.account = Some(account);
    }

    /// Attach a shared account pool.
    pub fn set_account_manager(&mut self, manager: Arc<AccountManager>) {
        self.account_manager = Some(manager);
    }

    /// Register a subscriber for every normalized response.
    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.dispatcher.subscribe(subscriber);
    }

    /// Connect to the host and port this session was built with.
    pub async fn open(&mut self) -> Result<()> {
        let host = self.host.clone();
        let port = self.port;
        self.connect(&host, Some(port)).await
    }

    /// Log in with an account acquired from the attached [`AccountManager`].
    ///
    /// The account stays held until [`close`](Protocol::close). If the login
    /// fails the account is released before the error is returned.
    pub async fn login_with_manager(&mut self, name: &str) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.state != SessionState::ConnectedUnauthenticated {
            return Err(self.invalid("login"));
        }

        let manager = self
            .account_manager
            .clone()
            .ok_or(SessionError::NoAccountManager)?;

        let guard = manager.lock(name).await?;
        self.login(guard.account().clone()).await?;
        self.managed_account = Some(guard);
        Ok(())
    }

    /// Target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Account used for the last authentication attempt.
    pub fn current_account(&self) -> Option<&Arc<Account>> {
        self.account.as_ref()
    }

    /// The most recent normalized response.
    pub fn last_response(&self) -> Option<&str> {
        self.dispatcher.last_response()
    }

    /// The live transport session, if any.
    pub fn handle(&self) -> Option<&T::Session> {
        self.handle.as_ref()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The attached account pool, if any.
    pub fn account_manager(&self) -> Option<&Arc<AccountManager>> {
        self.account_manager.as_ref()
    }

    fn invalid(&self, operation: &'static str) -> Error {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
        .into()
    }
}

impl<T: Transport> Protocol for SessionAdapter<T> {
    async fn connect(&mut self, host: &str, port: Option<u16>) -> Result<()> {
        if self.state != SessionState::Unconnected {
            return Err(self.invalid("connect"));
        }

        self.host = host.to_string();
        self.port = port.unwrap_or(DEFAULT_PORT);

        let account = self.account.clone();
        let credentials = account
            .as_deref()
            .map_or(Credentials::None { username: None }, Account::credentials);

        debug!("session: connecting to {}:{}", self.host, self.port);
        match self.transport.connect(&self.host, self.port, credentials).await {
            Ok(session) => {
                self.handle = Some(session);
                self.state = SessionState::Authenticated;
                debug!("session: {} connected and authenticated", self.host);
            }
            Err(e) if e.is_authentication_failure() => {
                // Reachable; authentication is left to a later login()
                warn!("session: {} reachable but not authenticated: {}", self.host, e);
                self.handle = None;
                self.state = SessionState::ConnectedUnauthenticated;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    async fn login(&mut self, account: Arc<Account>) -> Result<()> {
        if self.handle.is_some() {
            debug!("session: {} already authenticated, login skipped", self.host);
            return Ok(());
        }
        if self.state != SessionState::ConnectedUnauthenticated {
            return Err(self.invalid("login"));
        }

        self.account = Some(account.clone());

        debug!("session: logging in to {} as '{}'", self.host, account.name());
        let session = self
            .transport
            .connect(&self.host, self.port, account.credentials())
            .await?;

        self.handle = Some(session);
        self.state = SessionState::Authenticated;
        debug!("session: {} authenticated as '{}'", self.host, account.name());
        Ok(())
    }

    async fn send(&mut self, payload: &str) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(self.invalid("send"));
        };

        self.dispatcher
            .dispatch(&self.transport, handle, payload, true)
            .await?;
        Ok(())
    }

    async fn execute(&mut self, command: &str) -> Result<(i32, String)> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(self.invalid("execute"));
        };

        let response = self
            .dispatcher
            .dispatch(&self.transport, handle, command, false)
            .await?
            .unwrap_or_default();
        Ok((EXECUTE_SUCCESS, response))
    }

    async fn close(&mut self, force: bool) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Err(self.invalid("close"));
        };

        let result = self.transport.close_session(handle, force).await;
        self.state = SessionState::Closed;

        if let Some(guard) = self.managed_account.take() {
            debug!("session: releasing pool account '{}'", guard.name());
        }

        debug!("session: {} closed", self.host);
        result
    }

    fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl<T: Transport> Drop for SessionAdapter<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!(
                "session to {}:{} dropped without close(); transport session abandoned",
                self.host, self.port
            );
        }
    }
}

impl<T: Transport> std::fmt::Debug for SessionAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAdapter")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("account", &self.account.as_ref().map(|a| a.name()))
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
