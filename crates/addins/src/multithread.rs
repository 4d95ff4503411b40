//! Nested-call and result-ownership scenarios.
//!
//! Every caller here re-enters the dispatcher from inside its own body -
//! by name or by the identifier captured at load time - while the worker
//! pool runs the same functions on other threads. The concat family exists
//! in two conventions: the leaky one allocates and never reclaims, so the
//! live-allocation count grows with every call; the managed one tags its
//! results owned and releases its intermediates so exactly one release
//! happens per value.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use recalc_addin_protocol::{
    Addin, AllocKind, CallContext, CallingConvention, FunctionSpec, HostApi, HostResult,
    RegisterId, Registration, Target, Variant, WideString, MAX_TEXT_UNITS,
};

const CATEGORY: &str = "Multithread Demo";

/// Registered names, in registration order. Unload walks this list.
const FUNCTIONS: [&str; 8] = [
    "AddInner",
    "AddCaller",
    "AddCallerById",
    "AddCallerShared",
    "ConcatInner",
    "ConcatCaller",
    "ConcatManagedInner",
    "ConcatManagedCaller",
];

/// Identifier captured when an inner function registered, shared with the
/// caller closures that dispatch by identifier.
type CapturedId = Arc<Mutex<Option<RegisterId>>>;

pub struct MultithreadAddin {
    work_delay: Duration,
    add_inner_id: CapturedId,
    concat_managed_id: CapturedId,
}

impl MultithreadAddin {
    pub fn new() -> Self {
        Self::with_work_delay(Duration::from_millis(10))
    }

    /// Control the simulated work inside `AddInner`. Tests pass zero; the
    /// default keeps threading effects visible in interactive runs.
    pub fn with_work_delay(work_delay: Duration) -> Self {
        Self {
            work_delay,
            add_inner_id: Arc::new(Mutex::new(None)),
            concat_managed_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Register an inner function, capture its identifier, and cross-check
    /// the capture against a by-name evaluation. A mismatch is logged and
    /// left alone.
    fn register_inner(
        &self,
        host: &dyn HostApi,
        registration: Registration,
        captured: &CapturedId,
    ) -> HostResult<()> {
        let name = registration.spec.name.clone();
        let id = host.register(registration)?;
        match host.evaluate(&name) {
            Ok(evaluated) if evaluated == id => {
                tracing::debug!(function = %name, %id, "captured registration identifier");
            }
            Ok(evaluated) => {
                tracing::warn!(
                    function = %name,
                    registered = %id,
                    evaluated = %evaluated,
                    "registration identifier mismatch"
                );
            }
            Err(err) => {
                tracing::warn!(function = %name, %err, "identifier cross-check failed");
            }
        }
        *captured.lock().expect("captured id mutex poisoned") = Some(id);
        Ok(())
    }
}

impl Default for MultithreadAddin {
    fn default() -> Self {
        Self::new()
    }
}

impl Addin for MultithreadAddin {
    fn name(&self) -> &str {
        "Multithread Demo Add-In"
    }

    fn key(&self) -> &str {
        "multithread"
    }

    fn on_load(&self, host: &dyn HostApi) -> HostResult<()> {
        let delay = self.work_delay;
        self.register_inner(
            host,
            Registration::new(
                FunctionSpec::new("AddInner", "BBB$")
                    .with_args("x,y")
                    .with_category(CATEGORY)
                    .with_help("Inner add: returns x+y"),
                CallingConvention::Managed,
                move |_, args| {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    Ok(Variant::num(num_arg(args, 0) + num_arg(args, 1)))
                },
            ),
            &self.add_inner_id,
        )?;

        host.register(Registration::new(
            FunctionSpec::new("AddCaller", "BBB$")
                .with_args("x,y")
                .with_category(CATEGORY)
                .with_help("Caller: calls AddInner by name (leaks the name payload)"),
            CallingConvention::Leaky,
            add_caller_by_name,
        ))?;

        let captured = Arc::clone(&self.add_inner_id);
        host.register(Registration::new(
            FunctionSpec::new("AddCallerById", "BBB$")
                .with_args("x,y")
                .with_category(CATEGORY)
                .with_help("Caller: calls AddInner by captured identifier"),
            CallingConvention::Managed,
            move |ctx, args| add_caller_by_id(ctx, args, &captured),
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("AddCallerShared", "BBB$")
                .with_args("x,y")
                .with_category(CATEGORY)
                .with_help("Caller: routes arguments through the shared slot"),
            CallingConvention::Managed,
            add_caller_shared,
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("ConcatInner", "QQQ$")
                .with_args("str1,str2")
                .with_category(CATEGORY)
                .with_help("Inner concat: returns str1+str2"),
            CallingConvention::Leaky,
            |ctx, args| concat_inner(ctx, args, false),
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("ConcatCaller", "QQQ$")
                .with_args("str1,str2")
                .with_category(CATEGORY)
                .with_help("Caller: calls ConcatInner by name, frees nothing"),
            CallingConvention::Leaky,
            concat_caller_leaky,
        ))?;

        self.register_inner(
            host,
            Registration::new(
                FunctionSpec::new("ConcatManagedInner", "QQQ$")
                    .with_args("str1,str2")
                    .with_category(CATEGORY)
                    .with_help("Inner concat: returns str1+str2 (owned result)"),
                CallingConvention::Managed,
                |ctx, args| concat_inner(ctx, args, true),
            ),
            &self.concat_managed_id,
        )?;

        let captured = Arc::clone(&self.concat_managed_id);
        host.register(Registration::new(
            FunctionSpec::new("ConcatManagedCaller", "QQQ$")
                .with_args("str1,str2")
                .with_category(CATEGORY)
                .with_help("Caller: by captured identifier, releases what it owes"),
            CallingConvention::Managed,
            move |ctx, args| concat_caller_managed(ctx, args, &captured),
        ))?;

        Ok(())
    }

    fn on_unload(&self, host: &dyn HostApi) {
        for name in FUNCTIONS {
            host.unregister(name);
        }
        *self.add_inner_id.lock().expect("captured id mutex poisoned") = None;
        *self.concat_managed_id.lock().expect("captured id mutex poisoned") = None;
    }
}

fn num_arg(args: &[Variant], index: usize) -> f64 {
    args.get(index).and_then(Variant::as_num).unwrap_or(0.0)
}

fn text_arg(args: &[Variant], index: usize) -> WideString {
    args.get(index)
        .and_then(Variant::as_text)
        .cloned()
        .unwrap_or_default()
}

/// By-name nested add. Keeps its numeric arguments in the calling thread's
/// private cache and builds the name payload fresh on every call without
/// ever freeing it.
fn add_caller_by_name(ctx: &CallContext<'_>, args: &[Variant]) -> HostResult<Variant> {
    let cache = ctx.thread_cache();
    let mut cache = cache.lock().expect("thread cache mutex poisoned");
    let slots = cache.arg_slots(2);
    slots[0].set_num(num_arg(args, 0));
    slots[1].set_num(num_arg(args, 1));

    // Fresh name payload per call, never freed.
    let name_alloc = ctx.allocate(AllocKind::Text, "AddInner".len())?;
    let name = Variant::text("AddInner").with_alloc(name_alloc);
    let target = Target::Name(
        name.as_text()
            .map(WideString::to_string_lossy)
            .unwrap_or_default(),
    );

    match ctx.dispatch(&target, &slots[..2]) {
        Ok(dispatched) => Ok(Variant::num(dispatched.value.as_num().unwrap_or(0.0))),
        Err(err) => {
            tracing::debug!(%err, "nested add failed, returning default");
            Ok(Variant::num(0.0))
        }
    }
}

/// By-identifier nested add against the identifier captured at load time.
fn add_caller_by_id(
    ctx: &CallContext<'_>,
    args: &[Variant],
    captured: &CapturedId,
) -> HostResult<Variant> {
    let id = match *captured.lock().expect("captured id mutex poisoned") {
        Some(id) => id,
        None => return Ok(Variant::num(0.0)),
    };

    let cache = ctx.thread_cache();
    let mut cache = cache.lock().expect("thread cache mutex poisoned");
    let slots = cache.arg_slots(2);
    slots[0].set_num(num_arg(args, 0));
    slots[1].set_num(num_arg(args, 1));

    match ctx.dispatch(&Target::Id(id), &slots[..2]) {
        Ok(dispatched) => Ok(Variant::num(dispatched.value.as_num().unwrap_or(0.0))),
        Err(err) => {
            tracing::debug!(%err, "nested add by id failed, returning default");
            Ok(Variant::num(0.0))
        }
    }
}

/// Nested add through the argument slot every worker thread aliases.
///
/// The two writes and the later read-back are separate lock acquisitions:
/// between them, any other thread may overwrite either slot. Stale or
/// mixed argument pairs are the expected observation under concurrency.
fn add_caller_shared(ctx: &CallContext<'_>, args: &[Variant]) -> HostResult<Variant> {
    let shared = ctx.shared_args();
    {
        let mut slots = shared.lock().expect("shared args mutex poisoned");
        if slots.len() < 2 {
            slots.resize(2, Variant::nil());
        }
        slots[0].set_num(num_arg(args, 0));
    }
    {
        let mut slots = shared.lock().expect("shared args mutex poisoned");
        slots[1].set_num(num_arg(args, 1));
    }

    let (x, y) = {
        let slots = shared.lock().expect("shared args mutex poisoned");
        (slots[0].clone(), slots[1].clone())
    };

    match ctx.dispatch(&Target::from("AddInner"), &[x, y]) {
        Ok(dispatched) => Ok(Variant::num(dispatched.value.as_num().unwrap_or(0.0))),
        Err(err) => {
            tracing::debug!(%err, "shared-slot nested add failed, returning default");
            Ok(Variant::num(0.0))
        }
    }
}

/// Concatenation capped at [`MAX_TEXT_UNITS`]. Allocates the result
/// backing storage either untagged (nobody reclaims it) or owned
/// (the receiver must).
fn concat_inner(ctx: &CallContext<'_>, args: &[Variant], owned: bool) -> HostResult<Variant> {
    let joined = text_arg(args, 0).concat_capped(&text_arg(args, 1), MAX_TEXT_UNITS);
    let alloc = ctx.allocate(AllocKind::Text, joined.len())?;
    let result = Variant::text(joined).with_alloc(alloc);
    Ok(if owned { result.mark_owned() } else { result })
}

/// By-name nested concat that copies both arguments into fresh
/// allocations, copies the result into another, and frees none of it.
fn concat_caller_leaky(ctx: &CallContext<'_>, args: &[Variant]) -> HostResult<Variant> {
    let copy = |text: WideString| -> HostResult<Variant> {
        let alloc = ctx.allocate(AllocKind::Text, text.len())?;
        Ok(Variant::text(text).with_alloc(alloc))
    };
    let call_args = [copy(text_arg(args, 0))?, copy(text_arg(args, 1))?];

    match ctx.dispatch(&Target::from("ConcatInner"), &call_args) {
        Ok(dispatched) => copy(
            dispatched
                .value
                .as_text()
                .cloned()
                .unwrap_or_default(),
        ),
        Err(err) => {
            tracing::debug!(%err, "nested concat failed, returning empty");
            copy(WideString::new())
        }
    }
}

/// By-identifier nested concat under the managed convention: argument
/// copies and the inner result are each released exactly once; the
/// returned value is tagged owned for the receiver to release.
fn concat_caller_managed(
    ctx: &CallContext<'_>,
    args: &[Variant],
    captured: &CapturedId,
) -> HostResult<Variant> {
    let owned_copy = |text: WideString| -> HostResult<Variant> {
        let alloc = ctx.allocate(AllocKind::Text, text.len())?;
        Ok(Variant::text(text).with_alloc(alloc).mark_owned())
    };

    let id = match *captured.lock().expect("captured id mutex poisoned") {
        Some(id) => id,
        None => return owned_copy(WideString::new()),
    };

    let call_args = [
        owned_copy(text_arg(args, 0))?,
        owned_copy(text_arg(args, 1))?,
    ];
    let outcome = ctx.dispatch(&Target::Id(id), &call_args);
    ctx.release(&call_args[0]);
    ctx.release(&call_args[1]);

    match outcome {
        Ok(dispatched) => {
            let result = owned_copy(
                dispatched
                    .value
                    .as_text()
                    .cloned()
                    .unwrap_or_default(),
            )?;
            if dispatched.must_release {
                ctx.release(&dispatched.value);
            }
            Ok(result)
        }
        Err(err) => {
            tracing::debug!(%err, "managed nested concat failed, returning empty");
            owned_copy(WideString::new())
        }
    }
}
