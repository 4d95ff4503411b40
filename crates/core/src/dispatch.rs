//! The re-entrant call path.
//!
//! A dispatch resolves its target through the registry, invokes the
//! callable synchronously on the calling thread, and hands the result back
//! with the caller's release obligation. Nested calls are same-thread
//! recursion: a callable body dispatching another target runs it to
//! completion inside its own frame, exactly like the host's nested
//! user-function calls, while other worker threads dispatch concurrently
//! against the same registry.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use recalc_addin_protocol::{
    CallContext, Dispatched, HostApi, HostError, HostResult, Target, Variant,
};

use crate::registry::Registry;

/// Locates callables and runs invocations against a shared [`Registry`].
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Run one invocation.
    ///
    /// Resolution failures propagate as `NotFound` before anything is
    /// allocated. A callable that faults - panics or returns an error -
    /// surfaces as `CallFailed` to the immediate caller only; the registry
    /// and the allocator's bookkeeping of prior allocations are untouched.
    pub fn dispatch(
        &self,
        host: &dyn HostApi,
        target: &Target,
        args: &[Variant],
        depth: usize,
    ) -> HostResult<Dispatched> {
        let entry = self.registry.resolve(target)?;
        let name = entry.registration.spec.name.clone();
        tracing::trace!(%target, depth, "dispatch");

        let context = CallContext::new(host, depth);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (entry.registration.callable)(&context, args)
        }));

        match outcome {
            Ok(Ok(value)) => {
                let must_release = value.is_owned();
                Ok(Dispatched { value, must_release })
            }
            Ok(Err(err)) => Err(HostError::CallFailed {
                function: name,
                reason: err.to_string(),
            }),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::warn!(function = %name, reason = %reason, "callable panicked");
                Err(HostError::CallFailed { function: name, reason })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callable panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use recalc_addin_protocol::{CallingConvention, FunctionSpec, HostApi, Registration, Target, Variant};

    use crate::host::Host;

    fn register_add(host: &Host) {
        host.register(Registration::new(
            FunctionSpec::new("Add", "BBB$"),
            CallingConvention::Managed,
            |_, args| {
                let x = args.first().and_then(Variant::as_num).unwrap_or(0.0);
                let y = args.get(1).and_then(Variant::as_num).unwrap_or(0.0);
                Ok(Variant::num(x + y))
            },
        ))
        .unwrap();
    }

    #[test]
    fn unknown_targets_fail_without_allocating() {
        let host = Host::new();
        let before = host.allocator().stats();

        let err = host.dispatch(&Target::from("Missing"), &[]).unwrap_err();
        assert!(matches!(err, recalc_addin_protocol::HostError::NotFound(_)));
        assert_eq!(host.allocator().stats(), before);
    }

    #[test]
    fn name_and_identifier_dispatch_produce_identical_results() {
        let host = Host::new();
        register_add(&host);
        let id = host.evaluate("Add").unwrap();
        let args = [Variant::num(2.0), Variant::num(3.0)];

        let by_name = host.dispatch(&Target::from("Add"), &args).unwrap();
        let by_id = host.dispatch(&Target::from(id), &args).unwrap();
        assert_eq!(by_name.value, by_id.value);
        assert_eq!(by_name.value.as_num(), Some(5.0));
    }

    #[test]
    fn nested_dispatch_runs_on_the_calling_thread() {
        let host = Host::new();
        register_add(&host);
        host.register(Registration::new(
            FunctionSpec::new("Outer", "BBB$"),
            CallingConvention::Managed,
            |ctx, args| {
                let outer_token = ctx.thread_token();
                let inner = ctx.dispatch(&Target::from("Add"), args)?;
                // Same-thread recursion: the inner frame sees the same worker.
                assert_eq!(ctx.thread_token(), outer_token);
                Ok(inner.value)
            },
        ))
        .unwrap();

        let result = host
            .dispatch(&Target::from("Outer"), &[Variant::num(4.0), Variant::num(6.0)])
            .unwrap();
        assert_eq!(result.value.as_num(), Some(10.0));
    }

    #[test]
    fn nested_frames_report_increasing_depth() {
        let host = Host::new();
        host.register(Registration::new(
            FunctionSpec::new("Leaf", "B$"),
            CallingConvention::Managed,
            |ctx, _| Ok(Variant::num(ctx.depth() as f64)),
        ))
        .unwrap();
        host.register(Registration::new(
            FunctionSpec::new("Branch", "B$"),
            CallingConvention::Managed,
            |ctx, _| Ok(ctx.dispatch(&Target::from("Leaf"), &[])?.value),
        ))
        .unwrap();

        let direct = host.dispatch(&Target::from("Leaf"), &[]).unwrap();
        let nested = host.dispatch(&Target::from("Branch"), &[]).unwrap();
        assert_eq!(direct.value.as_num(), Some(0.0));
        assert_eq!(nested.value.as_num(), Some(1.0));
    }

    #[test]
    fn a_panicking_callable_surfaces_call_failed_and_corrupts_nothing() {
        let host = Host::new();
        register_add(&host);
        host.register(Registration::new(
            FunctionSpec::new("Faulty", "B$"),
            CallingConvention::Managed,
            |ctx, _| {
                // An allocation made before the fault stays tracked.
                ctx.allocate(recalc_addin_protocol::AllocKind::Value, 1)?;
                panic!("deliberate fault");
            },
        ))
        .unwrap();

        let err = host.dispatch(&Target::from("Faulty"), &[]).unwrap_err();
        match err {
            recalc_addin_protocol::HostError::CallFailed { function, reason } => {
                assert_eq!(function, "Faulty");
                assert!(reason.contains("deliberate fault"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Registry state survives the fault.
        let result = host
            .dispatch(&Target::from("Add"), &[Variant::num(1.0), Variant::num(2.0)])
            .unwrap();
        assert_eq!(result.value.as_num(), Some(3.0));
        // The pre-fault allocation is still accounted for.
        assert_eq!(host.allocator().live_count(), 1);
    }

    #[test]
    fn an_erroring_callable_maps_to_call_failed() {
        let host = Host::new();
        host.register(Registration::new(
            FunctionSpec::new("Refuses", "B$"),
            CallingConvention::Managed,
            |_, _| {
                Err(recalc_addin_protocol::HostError::AllocationFailed(
                    "backing store unavailable".to_string(),
                ))
            },
        ))
        .unwrap();

        let err = host.dispatch(&Target::from("Refuses"), &[]).unwrap_err();
        assert!(matches!(
            err,
            recalc_addin_protocol::HostError::CallFailed { .. }
        ));
    }
}
