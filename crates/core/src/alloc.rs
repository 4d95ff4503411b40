//! Allocator discipline bookkeeping.
//!
//! Stand-in for the host process's allocator: `allocate` and `free` are
//! safe to call from any thread, and every live allocation is tracked by
//! handle so the test suite can detect leaks and double-frees per scenario.
//! The tracking is test instrumentation; the production contract is just
//! "one owner reclaims each allocation, exactly once".

use std::collections::HashMap;
use std::sync::Mutex;

use recalc_addin_protocol::{AllocId, AllocKind, HostError, HostResult, Variant};

/// Snapshot of the allocator's bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Allocations not yet freed.
    pub live: usize,
    /// Allocations handed out over the allocator's lifetime.
    pub total_allocated: u64,
    /// Successful frees.
    pub freed: u64,
    /// Frees of handles that were unknown or already freed.
    pub double_frees: u64,
}

#[derive(Debug)]
struct AllocEntry {
    kind: AllocKind,
    size: usize,
}

#[derive(Debug, Default)]
struct AllocState {
    next: u64,
    live: HashMap<u64, AllocEntry>,
    total_allocated: u64,
    freed: u64,
    double_frees: u64,
}

/// Process-wide allocator stand-in with leak/double-free tracking.
pub struct Allocator {
    state: Mutex<AllocState>,
    capacity: Option<usize>,
}

impl Allocator {
    pub fn new() -> Self {
        Self { state: Mutex::new(AllocState::default()), capacity: None }
    }

    /// An allocator that refuses requests once `capacity` allocations are
    /// live, for exhaustion tests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { state: Mutex::new(AllocState::default()), capacity: Some(capacity) }
    }

    /// Reserve tracked backing storage. Handles are assigned monotonically
    /// and never reused.
    pub fn allocate(&self, kind: AllocKind, size: usize) -> HostResult<AllocId> {
        let mut state = self.state.lock().expect("allocator mutex poisoned");
        if let Some(capacity) = self.capacity {
            if state.live.len() >= capacity {
                return Err(HostError::AllocationFailed(format!(
                    "allocator capacity of {capacity} live allocations reached"
                )));
            }
        }
        state.next += 1;
        let id = AllocId(state.next);
        state.live.insert(id.0, AllocEntry { kind, size });
        state.total_allocated += 1;
        tracing::trace!(%id, ?kind, size, "allocate");
        Ok(id)
    }

    /// Free one handle. Returns false when the handle is unknown or was
    /// already freed; either way the double-free counter records it.
    pub fn free(&self, id: AllocId) -> bool {
        let mut state = self.state.lock().expect("allocator mutex poisoned");
        if let Some(entry) = state.live.remove(&id.0) {
            state.freed += 1;
            tracing::trace!(%id, kind = ?entry.kind, size = entry.size, "free");
            true
        } else {
            state.double_frees += 1;
            tracing::warn!(%id, "double free");
            false
        }
    }

    /// Release every tracked allocation a variant transitively owns: the
    /// value's own backing storage plus, for arrays, each element's.
    /// Returns false when any of it had already been freed.
    pub fn release(&self, variant: &Variant) -> bool {
        let mut clean = true;
        if let Some((_, _, values)) = variant.as_array() {
            for value in values {
                if value.alloc().is_some() || value.as_array().is_some() {
                    clean &= self.release(value);
                }
            }
        }
        if let Some(id) = variant.alloc() {
            clean &= self.free(id);
        }
        clean
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().expect("allocator mutex poisoned").live.len()
    }

    pub fn stats(&self) -> AllocStats {
        let state = self.state.lock().expect("allocator mutex poisoned");
        AllocStats {
            live: state.live.len(),
            total_allocated: state.total_allocated,
            freed: state.freed,
            double_frees: state.double_frees,
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recalc_addin_protocol::Variant;

    #[test]
    fn allocate_then_free_leaves_nothing_live() {
        let allocator = Allocator::new();
        let id = allocator.allocate(AllocKind::Text, 12).unwrap();
        assert_eq!(allocator.live_count(), 1);
        assert!(allocator.free(id));
        assert_eq!(allocator.live_count(), 0);
        assert_eq!(allocator.stats().double_frees, 0);
    }

    #[test]
    fn second_free_is_a_detectable_double_free() {
        let allocator = Allocator::new();
        let id = allocator.allocate(AllocKind::Value, 1).unwrap();
        assert!(allocator.free(id));
        assert!(!allocator.free(id));
        assert_eq!(allocator.stats().double_frees, 1);
    }

    #[test]
    fn capacity_exhaustion_fails_allocation() {
        let allocator = Allocator::with_capacity(2);
        allocator.allocate(AllocKind::Value, 1).unwrap();
        allocator.allocate(AllocKind::Value, 1).unwrap();
        let err = allocator.allocate(AllocKind::Value, 1).unwrap_err();
        assert!(matches!(err, HostError::AllocationFailed(_)));
    }

    #[test]
    fn release_reclaims_array_elements_transitively() {
        let allocator = Allocator::new();
        let array_id = allocator.allocate(AllocKind::Array, 2).unwrap();
        let element_id = allocator.allocate(AllocKind::Value, 1).unwrap();

        let mut array = Variant::array(2, 1).with_alloc(array_id).mark_owned();
        array.set_element(0, 0, Variant::num(1.0).with_alloc(element_id));
        array.set_element(1, 0, Variant::num(2.0));

        assert!(allocator.release(&array));
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn concurrent_allocate_and_free_keep_counters_consistent() {
        let allocator = Allocator::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let id = allocator.allocate(AllocKind::Value, 1).unwrap();
                        assert!(allocator.free(id));
                    }
                });
            }
        });
        let stats = allocator.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.total_allocated, 800);
        assert_eq!(stats.freed, 800);
        assert_eq!(stats.double_frees, 0);
    }
}
