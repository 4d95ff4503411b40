//! The registration table: name <-> identifier <-> callable.
//!
//! Registrations are created at add-in load time, read concurrently by any
//! number of dispatches afterwards, and torn down at unload time. One
//! exclusive lock serializes everything, so a `resolve` is a point-in-time
//! snapshot: it either fully succeeds against a still-valid entry or fails
//! with `NotFound`, never observing a half-torn entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use recalc_addin_protocol::{HostError, HostResult, RegisterId, Registration, Target};

/// A resolved registration, cloned out of the table as an atomic snapshot.
/// Holders keep the entry alive even if the name is unregistered while the
/// call is in flight.
#[derive(Debug)]
pub struct RegistryEntry {
    pub id: RegisterId,
    pub registration: Registration,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    by_id: HashMap<RegisterId, Arc<RegistryEntry>>,
    by_name: HashMap<String, RegisterId>,
}

/// The function registration table of one simulated host process.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self { state: Mutex::new(RegistryState::default()) }
    }

    /// Register a function under its spec's name. Identifiers are assigned
    /// monotonically starting at 1 and never reused within the registry's
    /// lifetime, even after `unregister`.
    pub fn register(&self, registration: Registration) -> HostResult<RegisterId> {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        let name = registration.spec.name.clone();
        if state.by_name.contains_key(&name) {
            return Err(HostError::DuplicateName(name));
        }
        state.next_id += 1;
        let id = RegisterId(state.next_id);
        let entry = Arc::new(RegistryEntry { id, registration });
        state.by_id.insert(id, entry);
        state.by_name.insert(name.clone(), id);
        tracing::debug!(%id, %name, "registered function");
        Ok(id)
    }

    /// Resolve a target by either key. Name and identifier are a stable
    /// bijection for a registration's lifetime, so both keys reach the
    /// identical entry.
    pub fn resolve(&self, target: &Target) -> HostResult<Arc<RegistryEntry>> {
        let state = self.state.lock().expect("registry mutex poisoned");
        let id = match target {
            Target::Name(name) => state.by_name.get(name).copied(),
            Target::Id(id) => Some(*id),
        };
        id.and_then(|id| state.by_id.get(&id).cloned())
            .ok_or_else(|| HostError::NotFound(target.clone()))
    }

    /// Look up the identifier currently bound to a name.
    pub fn evaluate(&self, name: &str) -> HostResult<RegisterId> {
        let state = self.state.lock().expect("registry mutex poisoned");
        state
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| HostError::NotFound(Target::Name(name.to_string())))
    }

    /// Remove a registration. Silent no-op when the name is absent, since
    /// close-time cleanup may run against names that never registered.
    pub fn unregister(&self, name: &str) {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        if let Some(id) = state.by_name.remove(name) {
            state.by_id.remove(&id);
            tracing::debug!(%id, name, "unregistered function");
        }
    }

    /// Snapshot of all live registrations, ordered by identifier.
    pub fn entries(&self) -> Vec<Arc<RegistryEntry>> {
        let state = self.state.lock().expect("registry mutex poisoned");
        let mut entries: Vec<_> = state.by_id.values().cloned().collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("registry mutex poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recalc_addin_protocol::{CallingConvention, FunctionSpec, Variant};

    fn constant(name: &str, value: f64) -> Registration {
        Registration::new(
            FunctionSpec::new(name, "B$"),
            CallingConvention::Managed,
            move |_, _| Ok(Variant::num(value)),
        )
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        registry.register(constant("One", 1.0)).unwrap();
        let err = registry.register(constant("One", 2.0)).unwrap_err();
        assert_eq!(err, HostError::DuplicateName("One".to_string()));
    }

    #[test]
    fn both_keys_resolve_the_identical_entry() {
        let registry = Registry::new();
        let id = registry.register(constant("One", 1.0)).unwrap();

        let by_name = registry.resolve(&Target::from("One")).unwrap();
        let by_id = registry.resolve(&Target::from(id)).unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_id));
        assert_eq!(registry.evaluate("One").unwrap(), id);
    }

    #[test]
    fn identifiers_are_never_reused() {
        let registry = Registry::new();
        let first = registry.register(constant("One", 1.0)).unwrap();
        registry.unregister("One");
        let second = registry.register(constant("One", 1.0)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn unregistered_names_fail_cleanly_by_both_keys() {
        let registry = Registry::new();
        let id = registry.register(constant("One", 1.0)).unwrap();
        registry.unregister("One");

        assert!(matches!(
            registry.resolve(&Target::from("One")),
            Err(HostError::NotFound(_))
        ));
        assert!(matches!(
            registry.resolve(&Target::from(id)),
            Err(HostError::NotFound(_))
        ));
    }

    #[test]
    fn unregistering_an_absent_name_is_a_no_op() {
        let registry = Registry::new();
        registry.unregister("NeverRegistered");
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_resolve_and_unregister_never_observe_torn_entries() {
        let registry = Arc::new(Registry::new());
        let id = registry.register(constant("Victim", 9.0)).unwrap();
        let target = Target::from(id);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        // Either a still-valid snapshot or a clean NotFound.
                        match registry.resolve(&target) {
                            Ok(entry) => assert_eq!(entry.registration.spec.name, "Victim"),
                            Err(err) => assert!(matches!(err, HostError::NotFound(_))),
                        }
                    }
                });
            }
            scope.spawn(|| {
                registry.unregister("Victim");
            });
        });

        assert!(matches!(
            registry.resolve(&target),
            Err(HostError::NotFound(_))
        ));
    }
}
