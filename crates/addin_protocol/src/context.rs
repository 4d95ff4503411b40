//! Per-invocation context handed to add-in function bodies.

use std::sync::{Arc, Mutex};

use crate::error::HostResult;
use crate::traits::HostApi;
use crate::types::{Dispatched, Target};
use crate::variant::{AllocId, AllocKind, Variant};

/// Reusable per-thread argument storage.
///
/// Callers that dispatch on every recalculation keep their argument
/// variants here instead of building fresh ones per call. A cache belongs
/// to exactly one worker thread and is never handed to another; the
/// deliberately shared slot on the host is the contrast case.
#[derive(Debug, Default)]
pub struct ThreadCache {
    args: Vec<Variant>,
}

impl ThreadCache {
    /// The first `count` argument slots, growing the cache with nil values
    /// on first use.
    pub fn arg_slots(&mut self, count: usize) -> &mut [Variant] {
        if self.args.len() < count {
            self.args.resize(count, Variant::nil());
        }
        &mut self.args[..count]
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// The implicit call frame: exists only for the duration of one invocation,
/// including any re-entrant sub-invocations it makes.
///
/// Created by the host per dispatch; gives the function body re-entrant
/// dispatch (same thread, one level deeper) and access to the host's
/// allocator and thread-keyed storage.
pub struct CallContext<'h> {
    host: &'h dyn HostApi,
    depth: usize,
}

impl<'h> CallContext<'h> {
    /// Created by the host for each invocation; add-in bodies only ever
    /// borrow one.
    pub fn new(host: &'h dyn HostApi, depth: usize) -> Self {
        Self { host, depth }
    }

    pub fn host(&self) -> &'h dyn HostApi {
        self.host
    }

    /// Nesting depth of this frame: 0 for a call arriving from the host,
    /// one more for each re-entrant level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Re-entrant dispatch: invoke another registered function from within
    /// this one, synchronously on the calling thread.
    pub fn dispatch(&self, target: &Target, args: &[Variant]) -> HostResult<Dispatched> {
        self.host.dispatch_nested(target, args, self.depth + 1)
    }

    pub fn allocate(&self, kind: AllocKind, size: usize) -> HostResult<AllocId> {
        self.host.allocate(kind, size)
    }

    pub fn release(&self, variant: &Variant) -> bool {
        self.host.release(variant)
    }

    /// Stable numeric identity of the calling worker thread.
    pub fn thread_token(&self) -> u64 {
        self.host.thread_token()
    }

    /// This thread's private argument cache.
    pub fn thread_cache(&self) -> Arc<Mutex<ThreadCache>> {
        self.host.thread_cache()
    }

    /// The argument slot deliberately shared by every worker thread.
    pub fn shared_args(&self) -> Arc<Mutex<Vec<Variant>>> {
        self.host.shared_args()
    }
}
