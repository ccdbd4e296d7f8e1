//! Account credential record.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::AccountError;

/// A named login account.
///
/// Accounts are immutable once built. Pools and sessions share them through
/// `Arc<Account>`, so every holder sees the same record.
///
/// Secret fields are wrapped in [`SecretString`] and never appear in `Debug`
/// output.
///
/// # Example
///
/// ```rust
/// use ferrisconf::Account;
///
/// let account = Account::new("oper")
///     .with_password("secret")
///     .with_authorization_password("enable-secret");
/// assert_eq!(account.name(), "oper");
/// ```
#[derive(Debug, Deserialize)]
#[serde(from = "AccountDef")]
pub struct Account {
    name: String,
    password: Option<SecretString>,
    key: Option<SecretString>,
    key_passphrase: Option<SecretString>,
    authorization_password: Option<SecretString>,
}

impl Account {
    /// Create an account with no secret material.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            key: None,
            key_passphrase: None,
            authorization_password: None,
        }
    }

    /// Set the login password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set private key material (OpenSSH or PEM text).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the passphrase protecting the private key.
    pub fn with_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(SecretString::from(passphrase.into()));
        self
    }

    /// Set the secondary password used for privilege escalation.
    pub fn with_authorization_password(mut self, password: impl Into<String>) -> Self {
        self.authorization_password = Some(SecretString::from(password.into()));
        self
    }

    /// The account name (login identity).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The login password, if any.
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// The private key material, if any.
    pub fn key(&self) -> Option<&SecretString> {
        self.key.as_ref()
    }

    /// The secondary (authorization) password, if any.
    pub fn authorization_password(&self) -> Option<&SecretString> {
        self.authorization_password.as_ref()
    }

    /// Check that the account can be used for authentication.
    pub fn validate(&self) -> Result<(), AccountError> {
        if self.name.is_empty() {
            return Err(AccountError::EmptyName);
        }
        Ok(())
    }

    /// Resolve the credentials to present to the transport.
    ///
    /// Key material takes precedence over the password. An unnamed account
    /// resolves to anonymous credentials.
    pub fn credentials(&self) -> Credentials<'_> {
        if self.name.is_empty() {
            return Credentials::None { username: None };
        }

        if let Some(key) = &self.key {
            Credentials::PrivateKey {
                username: &self.name,
                key,
                passphrase: self.key_passphrase.as_ref(),
            }
        } else if let Some(password) = &self.password {
            Credentials::Password {
                username: &self.name,
                password,
            }
        } else {
            Credentials::None {
                username: Some(&self.name),
            }
        }
    }
}

/// On-disk / config representation of an account.
#[derive(Deserialize)]
struct AccountDef {
    name: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    key_passphrase: Option<String>,
    #[serde(default)]
    authorization_password: Option<String>,
}

impl From<AccountDef> for Account {
    fn from(def: AccountDef) -> Self {
        Self {
            name: def.name,
            password: def.password.map(SecretString::from),
            key: def.key.map(SecretString::from),
            key_passphrase: def.key_passphrase.map(SecretString::from),
            authorization_password: def.authorization_password.map(SecretString::from),
        }
    }
}

/// Credentials resolved from an [`Account`], borrowed for one handshake.
#[derive(Debug, Clone, Copy)]
pub enum Credentials<'a> {
    /// No secret material. The transport may still try its default
    /// mechanism (e.g. `none` auth or an agent) with the given username.
    None { username: Option<&'a str> },

    /// Password authentication.
    Password {
        username: &'a str,
        password: &'a SecretString,
    },

    /// Private key authentication, key material held in memory.
    PrivateKey {
        username: &'a str,
        key: &'a SecretString,
        passphrase: Option<&'a SecretString>,
    },
}

impl<'a> Credentials<'a> {
    /// Username to authenticate as, if known.
    pub fn username(&self) -> Option<&'a str> {
        match self {
            Credentials::None { username } => *username,
            Credentials::Password { username, .. } => Some(username),
            Credentials::PrivateKey { username, .. } => Some(username),
        }
    }

    /// Whether any secret material is present.
    pub fn has_secret(&self) -> bool {
        !matches!(self, Credentials::None { .. })
    }
}

/// Anything that names an account in a pool.
///
/// Lets pool operations accept either a name or an account record.
pub trait AccountName {
    /// The name of the referenced account.
    fn account_name(&self) -> &str;
}

impl AccountName for str {
    fn account_name(&self) -> &str {
        self
    }
}

impl AccountName for String {
    fn account_name(&self) -> &str {
        self
    }
}

impl AccountName for Account {
    fn account_name(&self) -> &str {
        &self.name
    }
}

impl AccountName for Arc<Account> {
    fn account_name(&self) -> &str {
        &self.name
    }
}
