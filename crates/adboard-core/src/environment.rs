//! The two backing-store environments and their strict/lenient parsers.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Which set of backing stores (Postgres + Redis) a call operates on.
///
/// Every core entry point takes this as an explicit parameter; there is no
/// hidden global. The server keeps a *default* pointer for requests that do
/// not name an environment, but resolved handles are always per-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Stage,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Stage];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Stage => "stage",
        }
    }

    /// Strict parse used by the explicit switch operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEnvironment`] for any name outside the
    /// fixed {production, stage} set, before any store access happens.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "stage" => Ok(Environment::Stage),
            _ => Err(CoreError::InvalidEnvironment(raw.to_string())),
        }
    }

    /// Lenient resolution for the `x-environment` request header: missing or
    /// unrecognized values fall back to production.
    #[must_use]
    pub fn from_header(raw: Option<&str>) -> Self {
        raw.and_then(|v| Environment::parse(v).ok())
            .unwrap_or(Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
