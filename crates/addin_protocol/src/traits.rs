//! Core traits of the Recalc add-in protocol.
//!
//! - [`HostApi`] - the callback surface the host exposes to add-ins
//! - [`Addin`] - the load/unload contract an add-in implements

use std::sync::{Arc, Mutex};

use crate::context::ThreadCache;
use crate::error::HostResult;
use crate::types::{Dispatched, Registration, RegisterId, Target};
use crate::variant::{AllocId, AllocKind, Variant};

/// The callback surface the host exposes to add-ins.
///
/// This is the simulator's stand-in for the spreadsheet application's
/// native callback entry point: registration, name evaluation, re-entrant
/// dispatch, and the process-wide allocator all go through here. Every
/// method is safe to call from any worker thread at any time.
pub trait HostApi: Send + Sync {
    /// Register a function. Fails with `DuplicateName` if the name is
    /// already present; on success returns the host-assigned identifier,
    /// which stays valid until the name is unregistered.
    fn register(&self, registration: Registration) -> HostResult<RegisterId>;

    /// Remove a registration. Silent no-op when the name is absent: close
    /// time cleanup may run against names that never registered.
    fn unregister(&self, name: &str);

    /// Look up the identifier currently bound to a name.
    fn evaluate(&self, name: &str) -> HostResult<RegisterId>;

    /// Dispatch a call arriving from the host (depth 0).
    fn dispatch(&self, target: &Target, args: &[Variant]) -> HostResult<Dispatched> {
        self.dispatch_nested(target, args, 0)
    }

    /// Dispatch at an explicit nesting depth. Add-in bodies reach this
    /// through [`CallContext::dispatch`](crate::CallContext::dispatch),
    /// which bumps the depth for them.
    fn dispatch_nested(
        &self,
        target: &Target,
        args: &[Variant],
        depth: usize,
    ) -> HostResult<Dispatched>;

    /// Reserve tracked backing storage for a value the caller intends to
    /// return.
    fn allocate(&self, kind: AllocKind, size: usize) -> HostResult<AllocId>;

    /// Release a value's tracked backing storage, transitively. Returns
    /// false when any of it had already been freed (a detectable
    /// double-free).
    fn release(&self, variant: &Variant) -> bool;

    /// Stable numeric identity of the calling worker thread.
    fn thread_token(&self) -> u64;

    /// The calling thread's private argument cache.
    fn thread_cache(&self) -> Arc<Mutex<ThreadCache>>;

    /// The argument slot deliberately shared by all worker threads.
    fn shared_args(&self) -> Arc<Mutex<Vec<Variant>>>;
}

/// The contract between the host and one add-in plugin.
///
/// The host calls `on_load` once when the add-in is loaded; the add-in
/// registers every function it exposes and may capture the returned
/// identifiers for later by-identifier dispatch. `on_unload` runs once at
/// teardown, must be idempotent, and must not fault even if some
/// registrations never succeeded.
pub trait Addin: Send + Sync {
    /// Human-readable add-in name for logs and listings.
    fn name(&self) -> &str;

    /// Stable identifier for the add-in.
    fn key(&self) -> &str;

    fn on_load(&self, host: &dyn HostApi) -> HostResult<()>;

    fn on_unload(&self, host: &dyn HostApi);
}
