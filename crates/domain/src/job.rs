//! Service job: the payload handed to a background queue.
//!
//! A job names the service type and carries the unit's serialized
//! constructor parameters. The worker rebuilds an equivalent unit from them
//! and runs its deferred entry point.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::JobId;
use crate::time::{Timestamp, now};

/// Serialized constructor parameters of a service unit.
pub type Parameters = Map<String, Value>;

/// One unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceJob {
    pub id: JobId,
    /// Identifier of the service type (its `Service::NAME`).
    pub service: String,
    pub parameters: Parameters,
    pub enqueued_at: Timestamp,
}

impl ServiceJob {
    /// Build a fresh job stamped with the current time.
    #[must_use]
    pub fn new(service: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id: JobId::new(),
            service: service.into(),
            parameters,
            enqueued_at: now(),
        }
    }
}

/// Serialize `params` into job [`Parameters`].
///
/// # Errors
///
/// Returns a `serde_json` error if serialization fails or `params` does not
/// serialize to a JSON object.
pub fn to_parameters<P: Serialize>(params: &P) -> Result<Parameters, serde_json::Error> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "service parameters must serialize to an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Multiply {
        value: i64,
        multiplier: i64,
    }

    #[test]
    fn should_serialize_named_parameters_into_map() {
        let params = to_parameters(&Multiply {
            value: 5,
            multiplier: 3,
        })
        .unwrap();
        assert_eq!(params.get("value"), Some(&Value::from(5)));
        assert_eq!(params.get("multiplier"), Some(&Value::from(3)));
    }

    #[test]
    fn should_reject_non_object_parameters() {
        let result = to_parameters(&42);
        assert!(result.is_err());
    }

    #[test]
    fn should_roundtrip_job_through_serde_json() {
        let params = to_parameters(&Multiply {
            value: 7,
            multiplier: 2,
        })
        .unwrap();
        let job = ServiceJob::new("Multiply", params);
        let json = serde_json::to_string(&job).unwrap();
        let parsed: ServiceJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, job);
    }
}
