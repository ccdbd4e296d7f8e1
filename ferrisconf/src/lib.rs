//! # Ferrisconf
//!
//! Async NETCONF session adapter for network device automation.
//!
//! Ferrisconf gives automation tooling a uniform session lifecycle
//! (connect, login, send, execute, close) over a pluggable transport, plus a
//! shared account pool that serializes concurrent use of login accounts.
//!
//! ## Features
//!
//! - NETCONF over SSH via russh (base 1.0 and 1.1 framing)
//! - Deferred authentication: a session can connect first and log in later
//! - Shared account pool with FIFO-fair per-account locking
//! - Response subscribers for live logging and auditing
//! - Pluggable [`Transport`] trait for other wire protocols
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ferrisconf::{Account, AccountManager, Protocol, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrisconf::Error> {
//!     let pool = Arc::new(AccountManager::from_accounts([
//!         Account::new("oper").with_password("secret"),
//!     ])?);
//!
//!     let mut session = SessionBuilder::new("192.168.1.1")
//!         .account_manager(pool.clone())
//!         .subscribe(|line| print!("{line}"))
//!         .build()?;
//!
//!     // Reachable, not yet authenticated
//!     session.open().await?;
//!     session.login_with_manager("oper").await?;
//!
//!     let (_, reply) = session.execute("<get-config><source><running/></source></get-config>").await?;
//!     println!("{} bytes", reply.len());
//!
//!     session.close(false).await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use account::{Account, AccountGuard, AccountManager, Credentials};
pub use error::Error;
pub use session::{
    EXECUTE_SUCCESS, Protocol, ResponseDispatcher, SessionAdapter, SessionBuilder, SessionState,
};
pub use transport::{HostKeyVerification, Reply, RpcReply, SshConfig, SshTransport, Transport};
