//! Builder for creating sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::adapter::SessionAdapter;
use super::dispatch::Subscriber;
use crate::account::{Account, AccountManager};
use crate::error::Result;
use crate::transport::{DEFAULT_PORT, HostKeyVerification, SshConfig, SshTransport, Transport};

/// Builder for constructing session adapters.
///
/// # Example
///
/// ```rust,no_run
/// use ferrisconf::{Account, Protocol, SessionBuilder};
///
/// # async fn example() -> Result<(), ferrisconf::Error> {
/// let mut session = SessionBuilder::new("192.168.1.1")
///     .account(Account::new("admin").with_password("secret"))
///     .subscribe(|line| print!("{line}"))
///     .build()?;
///
/// session.open().await?;
/// session.execute("<get/>").await?;
/// session.close(false).await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    account: Option<Arc<Account>>,
    account_manager: Option<Arc<AccountManager>>,
    ssh_config: SshConfig,
    subscribers: Vec<Subscriber>,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            account: None,
            account_manager: None,
            ssh_config: SshConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Set the port (default: 830).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the account presented on connect.
    pub fn account(mut self, account: impl Into<Arc<Account>>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Attach a shared account pool.
    pub fn account_manager(mut self, manager: Arc<AccountManager>) -> Self {
        self.account_manager = Some(manager);
        self
    }

    /// Set the network timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.ssh_config.timeout = timeout;
        self
    }

    /// Set the SSH keepalive interval, or `None` to disable keepalives.
    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.ssh_config.keepalive_interval = interval;
        self
    }

    /// Whether to offer ssh-agent identities when no secret is configured.
    pub fn use_agent(mut self, use_agent: bool) -> Self {
        self.ssh_config.use_agent = use_agent;
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.ssh_config.host_key_verification = mode;
        self
    }

    /// Use a specific known_hosts file.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_config.known_hosts_path = Some(path.into());
        self
    }

    /// Username for connection attempts made without an account.
    pub fn default_username(mut self, username: impl Into<String>) -> Self {
        self.ssh_config.default_username = Some(username.into());
        self
    }

    /// Replace the advertised NETCONF capabilities.
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ssh_config.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Register a subscriber for every normalized response.
    pub fn subscribe<F>(mut self, subscriber: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Build a NETCONF-over-SSH session.
    ///
    /// This creates the session but does not connect. Call `open()` on the
    /// returned session to establish the connection.
    pub fn build(mut self) -> Result<SessionAdapter<SshTransport>> {
        let transport = SshTransport::new(std::mem::take(&mut self.ssh_config));
        self.build_with(transport)
    }

    /// Build a session over a custom transport.
    ///
    /// SSH-specific settings are ignored.
    pub fn build_with<T: Transport>(self, transport: T) -> Result<SessionAdapter<T>> {
        if let Some(account) = &self.account {
            account.validate()?;
        }

        let mut session = SessionAdapter::new(transport);
        session.set_target(self.host, self.port);
        if let Some(account) = self.account {
            session.set_account(account);
        }
        if let Some(manager) = self.account_manager {
            session.set_account_manager(manager);
        }
        for subscriber in self.subscribers {
            session.subscribe(subscriber);
        }

        Ok(session)
    }
}
