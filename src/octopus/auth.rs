//! Octopus Authentication
//!
//! Octopus authenticates API calls with a per-user API key sent in the
//! `X-Octopus-ApiKey` header.

use crate::error::{ExportError, Result};
use std::fmt;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-Octopus-ApiKey";

/// Environment variable read when no key is given explicitly
pub const API_KEY_ENV: &str = "OCTOPUS_CLI_API_KEY";

/// Octopus API key
///
/// Security: `Debug` never prints the key itself.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ExportError::Config("API key is empty".to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// Use `explicit` if given, otherwise `OCTOPUS_CLI_API_KEY`
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        if let Some(key) = explicit {
            return Self::new(key);
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) => Self::new(&key),
            Err(_) => Err(ExportError::Config(format!(
                "No API key given; pass --api-key or set {}",
                API_KEY_ENV
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "ApiKey({}****)", prefix)
    }
}
