//! Environment: where the current process runs.
//!
//! Only one question is asked of it: is this an interactive, development-like
//! process (where a developer wants deferred work to run right away) or a
//! deployed one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Execution environment of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    /// An interactive shell attached to a deployed application.
    Console,
    Staging,
    Production,
}

impl Environment {
    /// Whether deferred work may run inline when no worker is around.
    #[must_use]
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Development | Self::Test | Self::Console)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Console => "console",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an environment name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment `{0}`")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "console" => Ok(Self::Console),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}
