//! The simulated host process.
//!
//! A [`Host`] stands in for the spreadsheet application from the add-ins'
//! point of view: it owns the registry, the allocator, and the thread
//! store, implements the [`HostApi`] callback surface, and carries the
//! load/unload and free-callback contracts. One `Host` per simulated
//! process; everything on it is safe to share across worker threads.

use std::sync::{Arc, Mutex};

use recalc_addin_protocol::{
    Addin, AllocId, AllocKind, Dispatched, HostApi, HostResult, RegisterId, Registration, Target,
    ThreadCache, Variant,
};

use crate::alloc::Allocator;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::thread_store::ThreadStore;

pub struct Host {
    registry: Arc<Registry>,
    allocator: Arc<Allocator>,
    dispatcher: Dispatcher,
    threads: ThreadStore,
}

impl Host {
    pub fn new() -> Self {
        Self::with_allocator(Allocator::new())
    }

    /// A host over a specific allocator, for exhaustion scenarios.
    pub fn with_allocator(allocator: Allocator) -> Self {
        let registry = Arc::new(Registry::new());
        let allocator = Arc::new(allocator);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        Self {
            registry,
            allocator,
            dispatcher,
            threads: ThreadStore::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn thread_store(&self) -> &ThreadStore {
        &self.threads
    }

    /// Load-time contract: called once per add-in; the add-in registers
    /// every function it exposes and reports success or failure.
    pub fn load(&self, addin: &dyn Addin) -> HostResult<()> {
        tracing::info!(addin = addin.key(), "loading add-in");
        addin.on_load(self)
    }

    /// Unload-time contract: called once per add-in at teardown. The
    /// add-in's `on_unload` must be idempotent and tolerant of
    /// registrations that never succeeded.
    pub fn unload(&self, addin: &dyn Addin) {
        tracing::info!(addin = addin.key(), "unloading add-in");
        addin.on_unload(self);
    }

    /// Free-callback contract: the host calls this exactly once per owned
    /// value it received, releasing everything the value transitively
    /// owns. Returns false when some of it had already been freed.
    pub fn free(&self, variant: &Variant) -> bool {
        tracing::trace!(kind = variant.kind_str(), "free callback");
        self.allocator.release(variant)
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl HostApi for Host {
    fn register(&self, registration: Registration) -> HostResult<RegisterId> {
        self.registry.register(registration)
    }

    fn unregister(&self, name: &str) {
        self.registry.unregister(name);
    }

    fn evaluate(&self, name: &str) -> HostResult<RegisterId> {
        self.registry.evaluate(name)
    }

    fn dispatch_nested(
        &self,
        target: &Target,
        args: &[Variant],
        depth: usize,
    ) -> HostResult<Dispatched> {
        self.dispatcher.dispatch(self, target, args, depth)
    }

    fn allocate(&self, kind: AllocKind, size: usize) -> HostResult<AllocId> {
        self.allocator.allocate(kind, size)
    }

    fn release(&self, variant: &Variant) -> bool {
        self.allocator.release(variant)
    }

    fn thread_token(&self) -> u64 {
        self.threads.token_for_current()
    }

    fn thread_cache(&self) -> Arc<Mutex<ThreadCache>> {
        self.threads.cache_for_current()
    }

    fn shared_args(&self) -> Arc<Mutex<Vec<Variant>>> {
        self.threads.shared_args()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recalc_addin_protocol::{CallingConvention, FunctionSpec, HostError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAddin {
        loads: AtomicUsize,
        unloads: AtomicUsize,
    }

    impl CountingAddin {
        fn new() -> Self {
            Self { loads: AtomicUsize::new(0), unloads: AtomicUsize::new(0) }
        }
    }

    impl Addin for CountingAddin {
        fn name(&self) -> &str {
            "Counting Add-In"
        }

        fn key(&self) -> &str {
            "counting"
        }

        fn on_load(&self, host: &dyn HostApi) -> HostResult<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            host.register(Registration::new(
                FunctionSpec::new("Nop", "B$"),
                CallingConvention::Managed,
                |_, _| Ok(Variant::num(0.0)),
            ))?;
            Ok(())
        }

        fn on_unload(&self, host: &dyn HostApi) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            // Unregistering absent names must stay harmless.
            host.unregister("Nop");
            host.unregister("NeverRegistered");
        }
    }

    #[test]
    fn load_registers_and_unload_is_idempotent() {
        let host = Host::new();
        let addin = CountingAddin::new();

        host.load(&addin).unwrap();
        assert_eq!(host.registry().len(), 1);

        host.unload(&addin);
        host.unload(&addin);
        assert!(host.registry().is_empty());
        assert_eq!(addin.unloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn free_callback_releases_owned_values_once() {
        let host = Host::new();
        let id = host.allocate(AllocKind::Text, 8).unwrap();
        let value = Variant::text("returned").with_alloc(id).mark_owned();

        assert!(host.free(&value));
        assert_eq!(host.allocator().live_count(), 0);
        // A second free of the same returned value is the defect the
        // bookkeeping exists to catch.
        assert!(!host.free(&value));
        assert_eq!(host.allocator().stats().double_frees, 1);
    }

    #[test]
    fn allocator_exhaustion_surfaces_as_call_failed() {
        let host = Host::with_allocator(Allocator::with_capacity(0));
        host.register(Registration::new(
            FunctionSpec::new("NeedsStorage", "Q$"),
            CallingConvention::Managed,
            |ctx, _| {
                let id = ctx.allocate(AllocKind::Text, 4)?;
                Ok(Variant::text("data").with_alloc(id).mark_owned())
            },
        ))
        .unwrap();

        let err = host.dispatch(&Target::from("NeedsStorage"), &[]).unwrap_err();
        assert!(matches!(err, HostError::CallFailed { .. }));
    }

    #[test]
    fn duplicate_registration_fails_that_attempt_only() {
        let host = Host::new();
        let spec = FunctionSpec::new("Twice", "B$");
        host.register(Registration::new(
            spec.clone(),
            CallingConvention::Managed,
            |_, _| Ok(Variant::num(1.0)),
        ))
        .unwrap();

        let err = host
            .register(Registration::new(spec, CallingConvention::Managed, |_, _| {
                Ok(Variant::num(2.0))
            }))
            .unwrap_err();
        assert!(matches!(err, HostError::DuplicateName(_)));

        // The original registration still dispatches.
        let result = host.dispatch(&Target::from("Twice"), &[]).unwrap();
        assert_eq!(result.value.as_num(), Some(1.0));
    }
}
