//! Process resolver: picks the single entry point a service exposes.

use steroids_domain::error::DefinitionError;

use crate::service::{EntryPoints, Service};

/// The entry point an invocation will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedEntry {
    /// `process`, on the caller's task.
    Process,
    /// `deferred_process`, inline or through the queue.
    Deferred,
}

impl ResolvedEntry {
    #[must_use]
    pub fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Resolve the entry point of `S`.
///
/// Returns `Ok(None)` when `S` declares no entry point; the call is then a
/// no-op.
///
/// # Errors
///
/// Returns [`DefinitionError::AmbiguousEntryPoint`] when `S` declares both.
pub fn resolve<S: Service>() -> Result<Option<ResolvedEntry>, DefinitionError> {
    resolve_entry_points(S::NAME, S::ENTRY_POINTS)
}

/// Resolve a raw [`EntryPoints`] declaration on behalf of `service`.
///
/// # Errors
///
/// Returns [`DefinitionError::AmbiguousEntryPoint`] when both are declared.
pub fn resolve_entry_points(
    service: &'static str,
    entry_points: EntryPoints,
) -> Result<Option<ResolvedEntry>, DefinitionError> {
    match (entry_points.has_process(), entry_points.has_deferred()) {
        (true, true) => Err(DefinitionError::AmbiguousEntryPoint { service }),
        (true, false) => Ok(Some(ResolvedEntry::Process)),
        (false, true) => Ok(Some(ResolvedEntry::Deferred)),
        (false, false) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_process() {
        let entry = resolve_entry_points("Sync", EntryPoints::PROCESS).unwrap();
        assert_eq!(entry, Some(ResolvedEntry::Process));
    }

    #[test]
    fn should_resolve_deferred() {
        let entry = resolve_entry_points("Async", EntryPoints::DEFERRED).unwrap();
        assert_eq!(entry, Some(ResolvedEntry::Deferred));
        assert!(entry.unwrap().is_deferred());
    }

    #[test]
    fn should_resolve_nothing_when_no_entry_point() {
        assert_eq!(
            resolve_entry_points("Empty", EntryPoints::NONE).unwrap(),
            None
        );
    }

    #[test]
    fn should_reject_both_entry_points() {
        let result =
            resolve_entry_points("Both", EntryPoints::PROCESS.union(EntryPoints::DEFERRED));
        assert!(matches!(
            result,
            Err(DefinitionError::AmbiguousEntryPoint { service: "Both" })
        ));
    }
}
