//! NETCONF-over-SSH transport using russh.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use regex::Regex;
use russh::client::{self, Handle, Msg};
#[cfg(unix)]
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, decode_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::Transport;
use super::config::{BASE_1_1, HostKeyVerification, SshConfig};
use super::framing::{FrameDecoder, Framing};
use super::reply::{Reply, Request};
use crate::account::Credentials;
use crate::error::{Result, TransportError};

static CAPABILITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?capability>\s*([^<]+?)\s*</(?:\w+:)?capability>")
        .expect("capability pattern is valid")
});

static SESSION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?session-id>\s*(\d+)\s*</").expect("session-id pattern is valid")
});

/// NETCONF transport over an SSH `netconf` subsystem channel.
///
/// # Example
///
/// ```rust,no_run
/// use ferrisconf::{Account, Protocol, SessionAdapter, SshConfig, SshTransport};
///
/// # async fn example() -> Result<(), ferrisconf::Error> {
/// let mut session = SessionAdapter::new(SshTransport::new(SshConfig::default()));
/// session.connect("192.168.1.1", None).await?;
/// session.login(Account::new("admin").with_password("secret").into()).await?;
///
/// let (_, reply) = session.execute("<get-config><source><running/></source></get-config>").await?;
/// println!("{reply}");
///
/// session.close(false).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// The transport configuration.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Authenticate with the server.
    async fn authenticate(
        &self,
        session: &mut Handle<SshHandler>,
        credentials: Credentials<'_>,
    ) -> Result<()> {
        let (user, success) = match credentials {
            Credentials::None { username } => {
                let user = username
                    .map(str::to_string)
                    .unwrap_or_else(|| self.config.anonymous_username());
                let result = session
                    .authenticate_none(user.clone())
                    .await
                    .map_err(TransportError::Ssh)?;
                let mut success = result.success();
                if !success && self.config.use_agent {
                    let socket = self.config.agent_socket.as_deref();
                    success = authenticate_with_agent(session, &user, socket).await?;
                }
                (user, success)
            }
            Credentials::Password { username, password } => {
                let result = session
                    .authenticate_password(username, password.expose_secret())
                    .await
                    .map_err(TransportError::Ssh)?;
                (username.to_string(), result.success())
            }
            Credentials::PrivateKey {
                username,
                key,
                passphrase,
            } => {
                // Decoded in memory; the key never touches disk and is
                // dropped when this arm ends.
                let key = decode_secret_key(
                    key.expose_secret(),
                    passphrase.map(|p| p.expose_secret()),
                )
                .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                let result = session
                    .authenticate_publickey(
                        username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?;
                (username.to_string(), result.success())
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed { user }.into());
        }

        debug!("ssh: authenticated as '{}'", user);
        Ok(())
    }

    fn client_config(&self) -> client::Config {
        client::Config {
            inactivity_timeout: Some(self.config.timeout),
            keepalive_interval: self.config.keepalive_interval,
            ..Default::default()
        }
    }
}

/// Connect to the ssh-agent at `socket`, or at `SSH_AUTH_SOCK` when unset.
#[cfg(unix)]
async fn connect_agent(socket: Option<&Path>) -> Option<AgentClient<tokio::net::UnixStream>> {
    let connected = match socket {
        Some(path) => AgentClient::connect_uds(path).await,
        None => AgentClient::connect_env().await,
    };

    match connected {
        Ok(agent) => Some(agent),
        Err(e) => {
            debug!("ssh: no agent available: {}", e);
            None
        }
    }
}

/// Offer each identity held by the ssh-agent.
///
/// Returns `Ok(false)` when no agent is reachable or every identity is
/// rejected.
#[cfg(unix)]
async fn authenticate_with_agent(
    session: &mut Handle<SshHandler>,
    user: &str,
    socket: Option<&Path>,
) -> Result<bool> {
    let Some(mut agent) = connect_agent(socket).await else {
        return Ok(false);
    };
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            debug!("ssh: agent did not list identities: {}", e);
            return Ok(false);
        }
    };

    let hash_alg = session
        .best_supported_rsa_hash()
        .await
        .map_err(TransportError::Ssh)?
        .flatten();

    let count = identities.len();
    for (i, key) in identities.into_iter().enumerate() {
        trace!("ssh: offering agent identity {}/{} for '{}'", i + 1, count, user);
        match session
            .authenticate_publickey_with(user, key, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => {}
            Err(e) => debug!("ssh: agent signing failed: {}", e),
        }
    }

    debug!("ssh: all {} agent identities rejected for '{}'", count, user);
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _session: &mut Handle<SshHandler>,
    _user: &str,
    _socket: Option<&Path>,
) -> Result<bool> {
    Ok(false)
}

impl Transport for SshTransport {
    type Session = NetconfSession;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: Credentials<'_>,
    ) -> Result<NetconfSession> {
        let timeout = self.config.timeout;
        let ssh_config = Arc::new(self.client_config());

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: host.to_string(),
            port,
            host_key_verification: self.config.host_key_verification.clone(),
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("ssh: connecting to {}:{}", host, port);
        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(ssh_config, (host, port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic one
            let stored = host_key_error
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                    host: host.to_string(),
                    port,
                    source,
                },
                (None, e) => TransportError::Ssh(e),
            }
        })?;

        self.authenticate(&mut handle, credentials).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_subsystem(true, "netconf")
            .await
            .map_err(TransportError::Ssh)?;

        let mut session = NetconfSession {
            handle,
            channel,
            decoder: FrameDecoder::new(Framing::EndOfMessage),
            timeout,
            session_id: None,
            server_capabilities: Vec::new(),
        };
        session.exchange_hello(&self.config).await?;

        Ok(session)
    }

    async fn dispatch_rpc(&self, session: &mut NetconfSession, request: &Request) -> Result<Reply> {
        session.write_message(request.to_rpc_xml().as_bytes()).await?;

        loop {
            let message = session.read_message().await?;
            let reply = Reply::from_message(message);

            match &reply {
                Reply::Rpc(rpc) if !rpc.correlates_with(request) => {
                    warn!(
                        "netconf: skipping reply for message-id {:?} while waiting for {}",
                        rpc.message_id(),
                        request.message_id
                    );
                }
                Reply::Raw(raw) if raw.windows(13).any(|w| w == b"<notification") => {
                    debug!("netconf: skipping notification while waiting for reply");
                }
                _ => return Ok(reply),
            }
        }
    }

    async fn close_session(&self, mut session: NetconfSession, force: bool) -> Result<()> {
        if !force {
            let request = Request::new("close-session", "<close-session/>");
            match self.dispatch_rpc(&mut session, &request).await? {
                Reply::Rpc(reply) if reply.has_rpc_error() => {
                    warn!("netconf: close-session returned an error: {}", reply.xml());
                }
                _ => {}
            }
            if let Err(e) = session.channel.eof().await {
                debug!("netconf: failed to send eof: {}", e);
            }
        }

        session
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;

        debug!("netconf: session {:?} closed (force={})", session.session_id, force);
        Ok(())
    }
}

/// A live NETCONF session on an SSH channel.
pub struct NetconfSession {
    handle: Handle<SshHandler>,
    channel: Channel<Msg>,
    decoder: FrameDecoder,
    timeout: Duration,
    session_id: Option<u32>,
    server_capabilities: Vec<String>,
}

impl NetconfSession {
    /// Session id assigned by the server in its `<hello>`.
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Capabilities advertised by the server.
    pub fn server_capabilities(&self) -> &[String] {
        &self.server_capabilities
    }

    /// Framing negotiated for this session.
    pub fn framing(&self) -> Framing {
        self.decoder.framing()
    }

    /// Exchange `<hello>` messages and negotiate framing.
    async fn exchange_hello(&mut self, config: &SshConfig) -> Result<()> {
        self.write_message(render_hello(&config.capabilities).as_bytes())
            .await?;

        let hello = self.read_message().await?;
        let hello = String::from_utf8_lossy(&hello);
        if !hello.contains("hello") {
            return Err(TransportError::Framing {
                message: "expected <hello> from server".to_string(),
            }
            .into());
        }

        self.server_capabilities = CAPABILITY
            .captures_iter(&hello)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect();
        self.session_id = SESSION_ID
            .captures(&hello)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        if config.supports_chunked() && self.server_capabilities.iter().any(|c| c == BASE_1_1) {
            self.decoder.set_framing(Framing::Chunked);
        }

        debug!(
            "netconf: hello exchanged, session-id={:?}, {} server capabilities, framing={:?}",
            self.session_id,
            self.server_capabilities.len(),
            self.framing()
        );
        Ok(())
    }

    async fn write_message(&mut self, message: &[u8]) -> Result<()> {
        let mut out = BytesMut::with_capacity(message.len() + 32);
        self.framing().encode(message, &mut out);
        trace!("netconf: sending {} bytes", out.len());

        self.channel
            .data(&out[..])
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<Bytes> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.next_message())
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    /// Read from the channel until the buffer holds a complete message.
    async fn next_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = self.decoder.decode()? {
                trace!("netconf: received {} byte message", message.len());
                return Ok(message);
            }

            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => {
                    self.decoder.extend(data);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(TransportError::Disconnected.into());
                }
                Some(other) => trace!("netconf: ignoring channel message {:?}", other),
            }
        }
    }
}

impl std::fmt::Debug for NetconfSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetconfSession")
            .field("session_id", &self.session_id)
            .field("framing", &self.framing())
            .field("server_capabilities", &self.server_capabilities)
            .finish_non_exhaustive()
    }
}

fn render_hello(capabilities: &[String]) -> String {
    let mut hello = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities>"#,
    );
    for capability in capabilities {
        hello.push_str("<capability>");
        hello.push_str(capability);
        hello.push_str("</capability>");
    }
    hello.push_str("</capabilities></hello>");
    hello
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error for connect() to surface.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        *self
            .host_key_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };

        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::config::BASE_1_0;

    #[test]
    fn test_render_hello() {
        let hello = render_hello(&[BASE_1_0.to_string(), BASE_1_1.to_string()]);
        assert!(hello.starts_with("<?xml"));
        assert!(hello.contains(&format!("<capability>{BASE_1_1}</capability>")));
        assert!(hello.ends_with("</capabilities></hello>"));
    }

    #[test]
    fn test_parse_server_hello() {
        let hello = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.1</capability>
    <capability>
      urn:ietf:params:netconf:capability:candidate:1.0
    </capability>
  </capabilities>
  <session-id>4</session-id>
</hello>"#;

        let caps: Vec<_> = CAPABILITY
            .captures_iter(hello)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        assert_eq!(
            caps,
            vec![
                "urn:ietf:params:netconf:base:1.1",
                "urn:ietf:params:netconf:capability:candidate:1.0"
            ]
        );

        let id: Option<u32> = SESSION_ID
            .captures(hello)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        assert_eq!(id, Some(4));
    }

    #[test]
    fn test_idle_sessions_send_keepalives() {
        let transport = SshTransport::default();
        let config = transport.client_config();
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(30)));
        let keepalive = config.keepalive_interval.unwrap();
        assert!(keepalive < Duration::from_secs(30));

        let transport = SshTransport::new(SshConfig {
            keepalive_interval: None,
            ..Default::default()
        });
        assert_eq!(transport.client_config().keepalive_interval, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_agent_socket_falls_through() {
        let socket = std::env::temp_dir().join(format!("ferrisconf-no-agent-{}", std::process::id()));
        assert!(connect_agent(Some(&socket)).await.is_none());
    }

    #[test]
    fn test_default_config_advertises_chunked() {
        assert!(SshConfig::default().supports_chunked());
        let config = SshConfig {
            capabilities: vec![BASE_1_0.to_string()],
            ..Default::default()
        };
        assert!(!config.supports_chunked());
    }
}
