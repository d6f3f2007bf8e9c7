//! Process-wide defaults and per-call options.
//!
//! [`Settings`] are owned by a [`ServiceInvoker`](crate::invoker::ServiceInvoker)
//! and never change after construction. [`CallOptions`] travel with a single
//! call; any flag set on them wins over the matching default.

use serde::Deserialize;
use serde_json::Value;

use steroids_domain::environment::Environment;
use steroids_domain::job::Parameters;

/// Defaults applied to every invocation made through one invoker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run entry points inside a transaction.
    pub wrap_in_transaction: bool,
    /// Skip before/after hooks unless a call says otherwise.
    pub skip_callbacks: bool,
    /// Keep going despite errors unless a call says otherwise.
    pub force: bool,
    /// Where this process runs; drives the inline-vs-enqueue decision.
    pub environment: Environment,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wrap_in_transaction: true,
            skip_callbacks: false,
            force: false,
            environment: Environment::default(),
        }
    }
}

impl Settings {
    /// Merge call-time options over these defaults.
    #[must_use]
    pub fn resolve(&self, options: CallOptions) -> ResolvedOptions {
        ResolvedOptions {
            force: options.force.unwrap_or(self.force),
            skip_callbacks: options.skip_callbacks.unwrap_or(self.skip_callbacks),
            run_async: options.run_async.unwrap_or(true),
            arguments: options.arguments,
        }
    }
}

/// Per-call flags. `None` means "use the invoker's default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    pub force: Option<bool>,
    pub skip_callbacks: Option<bool>,
    /// Prefer background execution for deferred services. Defaults to `true`.
    pub run_async: Option<bool>,
    /// Extra call arguments, handed to before-hooks untouched.
    pub arguments: Parameters,
}

impl CallOptions {
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    #[must_use]
    pub fn skip_callbacks(mut self, skip: bool) -> Self {
        self.skip_callbacks = Some(skip);
        self
    }

    #[must_use]
    pub fn run_async(mut self, run_async: bool) -> Self {
        self.run_async = Some(run_async);
        self
    }

    #[must_use]
    pub fn argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Options after defaults have been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions {
    pub force: bool,
    pub skip_callbacks: bool,
    pub run_async: bool,
    pub arguments: Parameters,
}
