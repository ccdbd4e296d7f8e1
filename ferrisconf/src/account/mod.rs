//! Login accounts and the shared account pool.
//!
//! An [`Account`] is an immutable credential record. An [`AccountManager`]
//! owns a fixed set of accounts and hands them out one holder at a time, so
//! concurrent automation tasks never drive the same identity through a login
//! simultaneously.

#[allow(clippy::module_inception)]
mod account;
mod manager;

pub use account::{Account, AccountName, Credentials};
pub use manager::{AccountGuard, AccountManager};
