//! Identifiers of queued jobs and background workers.
//!
//! Both are random v4 UUIDs. They serialize as the bare UUID string, which is
//! also what a worker id looks like in configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text that does not name a job or a worker.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} id `{value}`")]
pub struct InvalidId {
    kind: &'static str,
    value: String,
    #[source]
    source: uuid::Error,
}

macro_rules! uuid_id {
    ($(#[doc = $doc:expr])* $name:ident, $kind:literal) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            #[must_use]
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(value: &str) -> Result<Self, InvalidId> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|source| InvalidId {
                    kind: $kind,
                    value: value.to_string(),
                    source,
                })
            }
        }
    };
}

uuid_id!(
    /// Identifier of a queued [`ServiceJob`](crate::job::ServiceJob).
    JobId,
    "job"
);

uuid_id!(
    /// Identity of a background worker, used for claims and heartbeats.
    WorkerId,
    "worker"
);
