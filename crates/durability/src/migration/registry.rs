//! Migration registry and path search.

use super::compat::FormatHandler;
use super::MigrationResult;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};
use vellum_core::{Error, Result, Version};

/// Migration step: transforms the bytes of one version into the next.
pub type MigrationFn = Box<dyn Fn(&[u8]) -> (Vec<u8>, MigrationResult) + Send + Sync>;

/// Registry of directed migrations and per-version format handlers.
///
/// Built once by the caller and passed by reference; all stored functions are
/// `Send + Sync`, so a finished registry can be shared read-only.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<(Version, Version), MigrationFn>,
    handlers: BTreeMap<Version, Box<dyn FormatHandler>>,
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("edges", &self.migrations.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the directed migration `from -> to`, replacing any previous one.
    pub fn register<F>(&mut self, from: Version, to: Version, migration: F)
    where
        F: Fn(&[u8]) -> (Vec<u8>, MigrationResult) + Send + Sync + 'static,
    {
        debug!(%from, %to, "Registered migration");
        self.migrations.insert((from, to), Box::new(migration));
    }

    /// Whether a direct edge `from -> to` exists.
    pub fn has_migration(&self, from: Version, to: Version) -> bool {
        self.migrations.contains_key(&(from, to))
    }

    /// Register the handler for its version, replacing any previous one.
    pub fn register_handler(&mut self, handler: Box<dyn FormatHandler>) {
        self.handlers.insert(handler.version(), handler);
    }

    /// Handler registered for `version`.
    pub fn handler(&self, version: Version) -> Option<&dyn FormatHandler> {
        self.handlers.get(&version).map(|h| h.as_ref())
    }

    /// Versions that have a handler, oldest first.
    pub fn supported_versions(&self) -> Vec<Version> {
        self.handlers.keys().copied().collect()
    }

    fn successors(&self, from: Version) -> impl Iterator<Item = Version> + '_ {
        let low = (from, Version::new(0, 0));
        let high = (from, Version::new(u16::MAX, u16::MAX));
        self.migrations.range(low..=high).map(|((_, to), _)| *to)
    }

    /// Shortest chain of versions from `from` to `to`.
    ///
    /// Returns `[from]` when the versions are equal and an empty vector when
    /// `to` is unreachable. Edges are explored in version order, so ties
    /// between equally short paths resolve deterministically.
    pub fn find_migration_path(&self, from: Version, to: Version) -> Vec<Version> {
        if from == to {
            return vec![from];
        }

        let mut parent: BTreeMap<Version, Version> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(from);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            for next in self.successors(current) {
                if !seen.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&prev) = parent.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return path;
                }
                queue.push_back(next);
            }
        }
        Vec::new()
    }

    /// Migrate `data` from `from` to `to`.
    ///
    /// On success the result holds one `Migrated from A to B` message per
    /// step plus every step's warnings. On failure the data is `None`, the
    /// failing step is recorded and the chain stops.
    pub fn migrate(
        &self,
        from: Version,
        to: Version,
        data: &[u8],
    ) -> (MigrationResult, Option<Vec<u8>>) {
        let mut result = MigrationResult::success(from, to);
        if from == to {
            result.add_message("No migration needed - same version");
            return (result, Some(data.to_vec()));
        }

        let path = self.find_migration_path(from, to);
        if path.is_empty() {
            result.add_error(format!("No migration path from {} to {}", from, to));
            warn!(%from, %to, "No migration path");
            return (result, None);
        }

        let mut current = data.to_vec();
        for step in path.windows(2) {
            let (step_from, step_to) = (step[0], step[1]);
            let Some(migration) = self.migrations.get(&(step_from, step_to)) else {
                result.add_error(format!("Missing migration {} -> {}", step_from, step_to));
                result.failed_step = Some((step_from, step_to));
                return (result, None);
            };

            let (output, step_result) = migration(&current);
            result.warnings.extend(step_result.warnings);
            if !step_result.success {
                result.messages.extend(step_result.messages);
                result.add_error(format!(
                    "Migration step {} -> {} failed",
                    step_from, step_to
                ));
                result.failed_step = Some((step_from, step_to));
                warn!(from = %step_from, to = %step_to, "Migration step failed");
                return (result, None);
            }

            result.add_message(format!("Migrated from {} to {}", step_from, step_to));
            debug!(
                from = %step_from,
                to = %step_to,
                bytes = output.len(),
                "Migration step applied"
            );
            current = output;
        }

        info!(%from, %to, steps = path.len() - 1, "Migration complete");
        (result, Some(current))
    }

    /// Like [`migrate`](Self::migrate) but converts failure into an error.
    pub fn migrate_or_err(
        &self,
        from: Version,
        to: Version,
        data: &[u8],
    ) -> Result<(Vec<u8>, MigrationResult)> {
        let (result, output) = self.migrate(from, to, data);
        if let Some(output) = output {
            return Ok((output, result));
        }
        match result.failed_step {
            Some((step_from, step_to)) => {
                // Prefer the step's own error over the generic step-failed line
                let reason = result
                    .messages
                    .iter()
                    .rev()
                    .filter_map(|m| m.strip_prefix(super::ERROR_PREFIX))
                    .nth(1)
                    .or_else(|| result.last_error())
                    .unwrap_or("unknown error")
                    .to_string();
                Err(Error::MigrationStepFailed {
                    from: step_from,
                    to: step_to,
                    reason,
                })
            }
            None => Err(Error::NoMigrationPath { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u16, minor: u16) -> Version {
        Version::new(major, minor)
    }

    fn append(
        byte: u8,
        from: Version,
        to: Version,
    ) -> impl Fn(&[u8]) -> (Vec<u8>, MigrationResult) {
        move |data: &[u8]| {
            let mut out = data.to_vec();
            out.push(byte);
            (out, MigrationResult::success(from, to))
        }
    }

    fn chain() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        registry.register(v(1, 0), v(1, 1), append(1, v(1, 0), v(1, 1)));
        registry.register(v(1, 1), v(2, 0), append(2, v(1, 1), v(2, 0)));
        registry
    }

    #[test]
    fn test_path_is_transitive() {
        let registry = chain();
        assert_eq!(
            registry.find_migration_path(v(1, 0), v(2, 0)),
            vec![v(1, 0), v(1, 1), v(2, 0)]
        );
        assert_eq!(registry.find_migration_path(v(1, 0), v(1, 0)), vec![v(1, 0)]);
    }

    #[test]
    fn test_edges_are_directed() {
        let registry = chain();
        assert!(registry.find_migration_path(v(2, 0), v(1, 0)).is_empty());
        assert!(registry.has_migration(v(1, 0), v(1, 1)));
        assert!(!registry.has_migration(v(1, 1), v(1, 0)));
    }

    #[test]
    fn test_shortest_path_preferred() {
        let mut registry = chain();
        registry.register(v(1, 0), v(2, 0), append(9, v(1, 0), v(2, 0)));
        assert_eq!(
            registry.find_migration_path(v(1, 0), v(2, 0)),
            vec![v(1, 0), v(2, 0)]
        );
    }

    #[test]
    fn test_migrate_applies_steps_in_order() {
        let registry = chain();
        let (result, data) = registry.migrate(v(1, 0), v(2, 0), &[0]);
        assert!(result.success);
        assert_eq!(data.unwrap(), vec![0, 1, 2]);
        assert_eq!(
            result.messages,
            vec![
                "Migrated from 1.0 to 1.1".to_string(),
                "Migrated from 1.1 to 2.0".to_string()
            ]
        );
    }

    #[test]
    fn test_same_version_is_noop() {
        let registry = MigrationRegistry::new();
        let (result, data) = registry.migrate(v(1, 0), v(1, 0), b"abc");
        assert!(result.success);
        assert_eq!(data.unwrap(), b"abc");
    }

    #[test]
    fn test_failing_step_aborts_chain() {
        let mut registry = chain();
        registry.register(v(2, 0), v(3, 0), |_: &[u8]| {
            (
                Vec::new(),
                MigrationResult::failure(v(2, 0), v(3, 0), "layout not understood"),
            )
        });
        registry.register(v(3, 0), v(4, 0), append(4, v(3, 0), v(4, 0)));

        let (result, data) = registry.migrate(v(1, 0), v(4, 0), &[0]);
        assert!(!result.success);
        assert!(data.is_none());
        assert_eq!(result.failed_step, Some((v(2, 0), v(3, 0))));
        assert!(result
            .messages
            .iter()
            .any(|m| m == "ERROR: layout not understood"));
        assert!(result.last_error().unwrap().contains("2.0 -> 3.0"));

        let err = registry.migrate_or_err(v(1, 0), v(4, 0), &[0]).unwrap_err();
        match err {
            Error::MigrationStepFailed { from, to, reason } => {
                assert_eq!((from, to), (v(2, 0), v(3, 0)));
                assert_eq!(reason, "layout not understood");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unreachable_target() {
        let registry = chain();
        let (result, data) = registry.migrate(v(1, 0), v(5, 0), &[]);
        assert!(!result.success);
        assert!(data.is_none());
        assert!(result.messages[0].starts_with("ERROR: "));
        assert!(matches!(
            registry.migrate_or_err(v(1, 0), v(5, 0), &[]),
            Err(Error::NoMigrationPath { .. })
        ));
    }
}
