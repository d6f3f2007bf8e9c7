//! Async dispatch decision: run deferred work now, or enqueue it.
//!
//! Inline execution is preferred while developing (no worker needed to see
//! the result); everywhere else deferred work goes to the queue.

use steroids_domain::environment::Environment;

/// Where deferred work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the caller's task, right now.
    Inline,
    /// Handed to the background queue.
    Enqueue,
}

/// Read-only inputs to [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSignals {
    /// Caller asked for background execution.
    pub requested_async: bool,
    /// At least one worker is consuming the queue.
    pub live_workers: bool,
    pub environment: Environment,
}

/// Decide inline vs. enqueue.
///
/// - Not requested async: always inline.
/// - Requested async: inline only in an interactive environment with no
///   live worker; enqueue otherwise.
#[must_use]
pub fn decide(signals: DispatchSignals) -> Dispatch {
    if !signals.requested_async {
        return Dispatch::Inline;
    }
    if signals.environment.is_interactive() && !signals.live_workers {
        Dispatch::Inline
    } else {
        Dispatch::Enqueue
    }
}
