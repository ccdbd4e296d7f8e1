//! SSH transport configuration.

use std::path::PathBuf;
use std::time::Duration;

/// NETCONF base 1.0 capability (end-of-message framing).
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// NETCONF base 1.1 capability (chunked framing).
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// Configuration for [`SshTransport`](super::SshTransport).
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Bound on every network wait (connect, hello, RPC reply).
    ///
    /// Also the SSH inactivity limit. Idle sessions stay up only while
    /// `keepalive_interval` is shorter than this.
    pub timeout: Duration,

    /// Interval between SSH keepalives on an otherwise idle session.
    /// `None` disables them.
    pub keepalive_interval: Option<Duration>,

    /// Offer ssh-agent identities when connecting without a secret.
    pub use_agent: bool,

    /// Agent socket. Defaults to `SSH_AUTH_SOCK`.
    pub agent_socket: Option<PathBuf>,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file (defaults to the user's).
    pub known_hosts_path: Option<PathBuf>,

    /// Username for attempts made without an account.
    pub default_username: Option<String>,

    /// Capabilities advertised in our `<hello>`.
    pub capabilities: Vec<String>,
}

impl SshConfig {
    /// Username to present when no account supplies one.
    ///
    /// Falls back to the local `USER`, then to an empty name.
    pub fn anonymous_username(&self) -> String {
        self.default_username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default()
    }

    /// Whether we advertise NETCONF base 1.1.
    pub fn supports_chunked(&self) -> bool {
        self.capabilities.iter().any(|c| c == BASE_1_1)
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keepalive_interval: Some(Duration::from_secs(10)),
            use_agent: true,
            agent_socket: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            default_username: None,
            capabilities: vec![BASE_1_0.to_string(), BASE_1_1.to_string()],
        }
    }
}
