//! Where the API key and base URL come from.
//!
//! Sources are tried in order by [`ChainedCredentials`]: environment
//! variables first, then the system keyring.

use keyring::Entry;
use tracing::debug;

pub const KEYRING_SERVICE: &str = "parley";
pub const KEYRING_USER: &str = "api-key";

const KEY_VARS: [&str; 2] = ["PARLEY_API_KEY", "OPENAI_API_KEY"];
const URL_VARS: [&str; 2] = ["PARLEY_BASE_URL", "OPENAI_BASE_URL"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(
        "no API key found; set PARLEY_API_KEY or OPENAI_API_KEY, or run `parley auth`"
    )]
    Missing,

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub trait CredentialSource: Send + Sync {
    fn active_credential(&self) -> Result<Credential, CredentialError>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvCredentials {
    lookup: Lookup,
    default_base_url: String,
}

impl EnvCredentials {
    pub fn new(default_base_url: impl Into<String>) -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), default_base_url)
    }

    pub fn from_lookup<F>(lookup: F, default_base_url: impl Into<String>) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            default_base_url: default_base_url.into(),
        }
    }

    fn first_set(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| (self.lookup)(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

impl CredentialSource for EnvCredentials {
    fn active_credential(&self) -> Result<Credential, CredentialError> {
        let api_key = self.first_set(&KEY_VARS).ok_or(CredentialError::Missing)?;
        let base_url = self
            .first_set(&URL_VARS)
            .unwrap_or_else(|| self.default_base_url.clone());
        Ok(Credential { api_key, base_url })
    }
}

pub struct KeyringCredentials {
    base_url: String,
}

impl KeyringCredentials {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn store(api_key: &str) -> Result<(), CredentialError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        entry.set_password(api_key)?;
        Ok(())
    }
}

impl CredentialSource for KeyringCredentials {
    fn active_credential(&self) -> Result<Credential, CredentialError> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        match entry.get_password() {
            Ok(api_key) if !api_key.trim().is_empty() => Ok(Credential {
                api_key: api_key.trim().to_string(),
                base_url: self.base_url.clone(),
            }),
            Ok(_) | Err(keyring::Error::NoEntry) => Err(CredentialError::Missing),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct ChainedCredentials {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainedCredentials {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Environment first, then keyring, both defaulting to `base_url`.
    pub fn standard(base_url: &str) -> Self {
        Self::new(vec![
            Box::new(EnvCredentials::new(base_url)),
            Box::new(KeyringCredentials::new(base_url)),
        ])
    }
}

impl CredentialSource for ChainedCredentials {
    fn active_credential(&self) -> Result<Credential, CredentialError> {
        let mut last_error = CredentialError::Missing;
        for source in &self.sources {
            match source.active_credential() {
                Ok(credential) => return Ok(credential),
                Err(err) => {
                    debug!(error = %err, "Credential source unavailable");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}
