//! Deterministic in-memory transport for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use secrecy::ExposeSecret;

use super::{Reply, Request, RpcReply, Transport};
use crate::account::Credentials;
use crate::error::{Result, TransportError};

#[derive(Debug, Default)]
struct StubState {
    passwords: HashMap<String, String>,
    key_users: HashSet<String>,
    anonymous: bool,
    unreachable: bool,
    raw_bodies: HashSet<String>,
    next_session: u32,
    connects: usize,
    requests: Vec<Request>,
    closed: Vec<(u32, bool)>,
}

/// Scriptable transport. Clones share state, so a test can keep a handle
/// for inspection after moving one into an adapter.
#[derive(Debug, Clone, Default)]
pub(crate) struct StubTransport {
    state: Arc<Mutex<StubState>>,
}

/// Session handle handed out by [`StubTransport`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct StubSession {
    pub(crate) id: u32,
    pub(crate) user: Option<String>,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Accept password logins for `user`.
    pub(crate) fn accept_password(self, user: &str, password: &str) -> Self {
        self.state()
            .passwords
            .insert(user.to_string(), password.to_string());
        self
    }

    /// Accept key logins for `user` (any key material).
    pub(crate) fn accept_key(self, user: &str) -> Self {
        self.state().key_users.insert(user.to_string());
        self
    }

    /// Accept connections without credentials.
    pub(crate) fn accept_anonymous(self) -> Self {
        self.state().anonymous = true;
        self
    }

    /// Fail every connect with a network error.
    pub(crate) fn unreachable(self) -> Self {
        self.state().unreachable = true;
        self
    }

    /// Toggle network failures on an already shared transport.
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Answer requests with this body with an opaque (non rpc-reply) value.
    pub(crate) fn raw_reply_for(self, body: &str) -> Self {
        self.state().raw_bodies.insert(body.to_string());
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.state().connects
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub(crate) fn closed(&self) -> Vec<(u32, bool)> {
        self.state().closed.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }
}

impl Transport for StubTransport {
    type Session = StubSession;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: Credentials<'_>,
    ) -> Result<StubSession> {
        let mut state = self.state();
        state.connects += 1;

        if state.unreachable {
            return Err(TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            }
            .into());
        }

        let accepted = match credentials {
            Credentials::None { .. } => state.anonymous,
            Credentials::Password { username, password } => state
                .passwords
                .get(username)
                .is_some_and(|expected| expected == password.expose_secret()),
            Credentials::PrivateKey { username, .. } => state.key_users.contains(username),
        };

        if !accepted {
            return Err(TransportError::AuthenticationFailed {
                user: credentials.username().unwrap_or_default().to_string(),
            }
            .into());
        }

        state.next_session += 1;
        Ok(StubSession {
            id: state.next_session,
            user: credentials.username().map(str::to_string),
        })
    }

    async fn dispatch_rpc(&self, session: &mut StubSession, request: &Request) -> Result<Reply> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if state.raw_bodies.contains(&request.body) {
            return Ok(Reply::Raw(Bytes::from(format!("raw:{}", request.body))));
        }

        Ok(Reply::Rpc(RpcReply::new(format!(
            r#"<rpc-reply session="{}"><data>{}</data></rpc-reply>"#,
            session.id, request.body
        ))))
    }

    async fn close_session(&self, session: StubSession, force: bool) -> Result<()> {
        self.state().closed.push((session.id, force));
        Ok(())
    }
}
