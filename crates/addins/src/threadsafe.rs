//! Thread-identity and owned-result scenarios.
//!
//! These functions return payloads stamped with the worker thread that
//! produced them, so a spreadsheet full of calls makes the recalculation
//! pool visible. The owned-result functions (`Scale`, `ThreadInfo`,
//! `FillArray`) exercise the free-callback contract; the nested pair
//! shows that re-entrant calls stay on the calling thread.

use std::time::Duration;

use recalc_addin_protocol::{
    Addin, AllocKind, CallContext, CallingConvention, FunctionSpec, HostApi, HostResult,
    Registration, Target, Variant, WideString,
};

const CATEGORY: &str = "Thread Safe Demo";

/// Registered names, in registration order. Unload walks this list.
const FUNCTIONS: [&str; 9] = [
    "Greet",
    "Calc",
    "Scale",
    "ThreadInfo",
    "FillArray",
    "Echo",
    "InnerThreadInfo",
    "NestedThreadInfo",
    "NestedThreadInfoExt",
];

/// Largest array `FillArray` will produce, whatever the requested size.
const MAX_ARRAY_ROWS: usize = 100;

pub struct ThreadSafeAddin {
    work_delay: Duration,
}

impl ThreadSafeAddin {
    pub fn new() -> Self {
        Self::with_work_delay(Duration::from_millis(10))
    }

    /// Control the simulated work inside `Calc`. Tests pass zero.
    pub fn with_work_delay(work_delay: Duration) -> Self {
        Self { work_delay }
    }
}

impl Default for ThreadSafeAddin {
    fn default() -> Self {
        Self::new()
    }
}

impl Addin for ThreadSafeAddin {
    fn name(&self) -> &str {
        "Thread Safe Demo Add-In"
    }

    fn key(&self) -> &str {
        "threadsafe"
    }

    fn on_load(&self, host: &dyn HostApi) -> HostResult<()> {
        host.register(Registration::new(
            FunctionSpec::new("Greet", "QQ$")
                .with_args("name")
                .with_category(CATEGORY)
                .with_help("Returns a greeting message with thread info"),
            CallingConvention::Managed,
            |ctx, args| {
                let name = args
                    .first()
                    .and_then(Variant::as_text)
                    .map(WideString::to_string_lossy)
                    .unwrap_or_default();
                Ok(Variant::text(format!(
                    "Hello {name}! Thread ID: {}",
                    ctx.thread_token()
                )))
            },
        ))?;

        let delay = self.work_delay;
        host.register(Registration::new(
            FunctionSpec::new("Calc", "BB$")
                .with_args("number")
                .with_category(CATEGORY)
                .with_help("Thread-safe calculation stamped with the thread id"),
            CallingConvention::Managed,
            move |ctx, args| {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                let number = args.first().and_then(Variant::as_num).unwrap_or(0.0);
                Ok(Variant::num(
                    number * number + number.sin() + ctx.thread_token() as f64,
                ))
            },
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("Scale", "QQ$")
                .with_args("input")
                .with_category(CATEGORY)
                .with_help("Doubles the input, returned as an owned value"),
            CallingConvention::Managed,
            |ctx, args| {
                let input = args.first().and_then(Variant::as_num).unwrap_or(0.0);
                let alloc = ctx.allocate(AllocKind::Value, 1)?;
                Ok(Variant::num(input * 2.0 + ctx.thread_token() as f64)
                    .with_alloc(alloc)
                    .mark_owned())
            },
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("ThreadInfo", "Q$")
                .with_category(CATEGORY)
                .with_help("Returns thread info as an owned text value"),
            CallingConvention::Managed,
            |ctx, _| {
                let info = format!("Thread: {}", ctx.thread_token());
                let alloc = ctx.allocate(AllocKind::Text, info.len())?;
                Ok(Variant::text(info).with_alloc(alloc).mark_owned())
            },
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("FillArray", "QQ$")
                .with_args("size")
                .with_category(CATEGORY)
                .with_help("Returns an owned array the free callback must reclaim"),
            CallingConvention::Managed,
            |ctx, args| fill_array(ctx, args),
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("Echo", "QQ$")
                .with_args("text")
                .with_category(CATEGORY)
                .with_help("Returns the input text unchanged"),
            CallingConvention::Managed,
            |_, args| {
                Ok(Variant::text(
                    args.first()
                        .and_then(Variant::as_text)
                        .cloned()
                        .unwrap_or_default(),
                ))
            },
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("InnerThreadInfo", "Q$")
                .with_category(CATEGORY)
                .with_help("Inner thread info for nested call tests"),
            CallingConvention::Managed,
            |ctx, _| Ok(Variant::text(format!("InnerThread:{}", ctx.thread_token()))),
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("NestedThreadInfo", "Q$")
                .with_category(CATEGORY)
                .with_help("Outer+inner thread info via a re-entrant call"),
            CallingConvention::Managed,
            |ctx, _| Ok(nested_thread_info(ctx, "InnerThreadInfo")),
        ))?;

        host.register(Registration::new(
            FunctionSpec::new("NestedThreadInfoExt", "QB$")
                .with_args("external")
                .with_category(CATEGORY)
                .with_help("Nested thread info; external targets an unresolved module"),
            CallingConvention::Managed,
            |ctx, args| {
                // The external target lives in another, unspecified module;
                // here it stays unresolved and the call degrades cleanly.
                let target = if args.first().is_some_and(Variant::is_truthy) {
                    "ExternalInnerThreadInfo"
                } else {
                    "InnerThreadInfo"
                };
                Ok(nested_thread_info(ctx, target))
            },
        ))?;

        Ok(())
    }

    fn on_unload(&self, host: &dyn HostApi) {
        for name in FUNCTIONS {
            host.unregister(name);
        }
    }
}

/// Owned rows x 1 array of thread-stamped numbers. The requested size is
/// clamped to `1..=MAX_ARRAY_ROWS`; requests beyond the cap produce
/// exactly the cap, never a wider write.
fn fill_array(ctx: &CallContext<'_>, args: &[Variant]) -> HostResult<Variant> {
    let requested = args.first().and_then(Variant::as_num).unwrap_or(5.0);
    let rows = (requested as isize).clamp(1, MAX_ARRAY_ROWS as isize) as usize;

    let alloc = ctx.allocate(AllocKind::Array, rows)?;
    let token = ctx.thread_token() as f64;
    let mut array = Variant::array(rows, 1);
    for row in 0..rows {
        array.set_element(row, 0, Variant::num(token + row as f64));
    }
    Ok(array.with_alloc(alloc).mark_owned())
}

/// "OuterThread:{tid}; {inner}", where the inner part comes from a
/// re-entrant dispatch and degrades to an error note when the target
/// cannot be resolved.
fn nested_thread_info(ctx: &CallContext<'_>, target: &str) -> Variant {
    let outer = ctx.thread_token();
    let inner = match ctx.dispatch(&Target::from(target), &[]) {
        Ok(dispatched) => dispatched
            .value
            .as_text()
            .map(WideString::to_string_lossy)
            .unwrap_or_default(),
        Err(err) => format!("Error:{err}"),
    };
    Variant::text(format!("OuterThread:{outer}; {inner}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recalc_core::harness::run_concurrent;
    use recalc_core::Host;

    fn loaded_host() -> Host {
        let host = Host::new();
        host.load(&ThreadSafeAddin::with_work_delay(Duration::ZERO))
            .unwrap();
        host
    }

    fn dispatch_one(host: &Host, name: &str, arg: Variant) -> recalc_addin_protocol::Dispatched {
        host.dispatch(&Target::from(name), &[arg]).unwrap()
    }

    #[test]
    fn echo_preserves_length_and_content() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "Echo", Variant::text("hello"));
        let text = dispatched.value.as_text().unwrap();
        assert_eq!(text.len(), 5);
        assert_eq!(text.to_string_lossy(), "hello");
        assert!(!dispatched.must_release);
    }

    #[test]
    fn echo_ignores_trailing_storage_in_its_input() {
        let host = loaded_host();
        let mut units: Vec<u16> = "hello".encode_utf16().collect();
        units.push(0x0BAD);
        let input = Variant::text(WideString::from_units(units, 5));

        let dispatched = dispatch_one(&host, "Echo", input);
        assert_eq!(dispatched.value.as_text().map(WideString::len), Some(5));
    }

    #[test]
    fn oversized_array_requests_are_capped_at_one_hundred() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "FillArray", Variant::num(300.0));
        let (rows, cols, values) = dispatched.value.as_array().unwrap();

        assert_eq!((rows, cols), (100, 1));
        assert_eq!(values.len(), 100);
        // Every element was initialized inside the bounds.
        assert!(values.iter().all(|value| value.as_num().is_some()));

        assert!(dispatched.must_release);
        assert!(host.free(&dispatched.value));
        assert_eq!(host.allocator().live_count(), 0);
    }

    #[test]
    fn array_requests_below_one_are_raised_to_one() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "FillArray", Variant::num(-7.0));
        let (rows, _, _) = dispatched.value.as_array().unwrap();
        assert_eq!(rows, 1);
        host.free(&dispatched.value);
    }

    #[test]
    fn nested_thread_info_runs_inner_on_the_same_thread() {
        let host = loaded_host();
        let dispatched = host.dispatch(&Target::from("NestedThreadInfo"), &[]).unwrap();
        let text = dispatched.value.as_text().unwrap().to_string_lossy();

        let outer: u64 = text
            .strip_prefix("OuterThread:")
            .and_then(|rest| rest.split(';').next())
            .and_then(|token| token.parse().ok())
            .unwrap();
        let inner: u64 = text
            .split("InnerThread:")
            .nth(1)
            .and_then(|token| token.parse().ok())
            .unwrap();
        assert_eq!(outer, inner);
    }

    #[test]
    fn unresolved_external_target_degrades_without_faulting() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "NestedThreadInfoExt", Variant::num(1.0));
        let text = dispatched.value.as_text().unwrap().to_string_lossy();
        assert!(text.starts_with("OuterThread:"));
        assert!(text.contains("Error:"));
    }

    #[test]
    fn external_flag_off_uses_the_local_inner_target() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "NestedThreadInfoExt", Variant::num(0.0));
        let text = dispatched.value.as_text().unwrap().to_string_lossy();
        assert!(text.contains("InnerThread:"));
        assert!(!text.contains("Error:"));
    }

    #[test]
    fn greeting_carries_the_name_through() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "Greet", Variant::text("World"));
        let text = dispatched.value.as_text().unwrap().to_string_lossy();
        assert!(text.starts_with("Hello World! Thread ID: "));
    }

    #[test]
    fn owned_results_round_trip_through_the_free_callback() {
        let host = loaded_host();
        let dispatched = dispatch_one(&host, "Scale", Variant::num(21.0));
        assert!(dispatched.must_release);

        let info = host.dispatch(&Target::from("ThreadInfo"), &[]).unwrap();
        assert!(info.must_release);
        assert_eq!(host.allocator().live_count(), 2);

        assert!(host.free(&dispatched.value));
        assert!(host.free(&info.value));
        assert_eq!(host.allocator().live_count(), 0);
        assert_eq!(host.allocator().stats().double_frees, 0);
    }

    #[test]
    fn concurrent_owned_results_never_leak_when_released() {
        let host = loaded_host();
        let report = run_concurrent(&host, &[Target::from("ThreadInfo")], 4, 100, |_, _| {
            Vec::new()
        });

        assert_eq!(report.failed(), 0);
        assert_eq!(report.alloc_stats.total_allocated, 400);
        assert_eq!(report.alloc_stats.live, 0);
        assert_eq!(report.alloc_stats.double_frees, 0);
    }

    #[test]
    fn calc_stamps_results_with_a_thread_token() {
        let host = loaded_host();
        let token = {
            // Token assignment is first-seen; dispatching once pins ours.
            host.dispatch(&Target::from("Calc"), &[Variant::num(0.0)])
                .unwrap()
                .value
                .as_num()
                .unwrap()
        };
        let value = host
            .dispatch(&Target::from("Calc"), &[Variant::num(2.0)])
            .unwrap()
            .value
            .as_num()
            .unwrap();
        assert_eq!(value, 4.0 + 2.0_f64.sin() + token);
    }
}
