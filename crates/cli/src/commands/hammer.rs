use std::time::Instant;

use anyhow::Result;
use colored::*;
use recalc_addin_protocol::{Target, Variant};
use recalc_core::harness::run_concurrent;
use recalc_core::Host;

use super::parse_arg;

pub fn execute(
    host: &Host,
    function: &str,
    raw_args: &[String],
    threads: usize,
    iterations: usize,
) -> Result<()> {
    let args: Vec<Variant> = raw_args.iter().map(|raw| parse_arg(raw)).collect();
    let targets = [Target::from(function)];

    println!(
        "Hammering {} with {} threads x {} iterations...",
        function.cyan().bold(),
        threads,
        iterations
    );

    let started = Instant::now();
    let report = run_concurrent(host, &targets, threads, iterations, |_, _| args.clone());
    let elapsed = started.elapsed();

    let failed = report.failed();
    let failed_display = if failed > 0 {
        failed.to_string().red().bold()
    } else {
        failed.to_string().green()
    };
    println!(
        "  calls={} ok={} failed={} elapsed={:.2?}",
        report.total(),
        report.completed().to_string().green(),
        failed_display,
        elapsed
    );

    // Distinct results make thread-stamped payloads visible at a glance.
    let mut distinct: Vec<String> = Vec::new();
    for value in report.values() {
        let rendered = value.to_string();
        if !distinct.contains(&rendered) {
            distinct.push(rendered);
            if distinct.len() > 5 {
                break;
            }
        }
    }
    let overflow = if distinct.len() > 5 { ", ..." } else { "" };
    println!(
        "  results: {}{}",
        distinct.iter().take(5).cloned().collect::<Vec<_>>().join(", "),
        overflow
    );

    let stats = report.alloc_stats;
    println!(
        "  allocations: live={} allocated={} freed={} double_frees={}",
        stats.live, stats.total_allocated, stats.freed, stats.double_frees
    );
    Ok(())
}
