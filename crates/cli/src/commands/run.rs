use std::path::Path;

use anyhow::Result;
use colored::*;
use recalc_core::configs::scenario::ScenarioConfig;
use recalc_core::harness::run_concurrent;
use recalc_core::Host;

pub fn execute(host: &Host, path: &Path) -> Result<()> {
    let scenario = ScenarioConfig::load(path)?;

    println!(
        "{} {} ({} threads x {} iterations per target)",
        "Scenario:".bold(),
        scenario.name.cyan().bold(),
        scenario.threads,
        scenario.iterations
    );

    for entry in &scenario.targets {
        let args = entry.arg_variants();
        let report = run_concurrent(
            host,
            &[entry.target()],
            scenario.threads,
            scenario.iterations,
            |_, _| args.clone(),
        );

        let failed = report.failed();
        let failed_display = if failed > 0 {
            failed.to_string().red().bold()
        } else {
            failed.to_string().green()
        };
        println!(
            "  {:<22} ok={} failed={} live_allocations={}",
            entry.function.cyan(),
            report.completed().to_string().green(),
            failed_display,
            report.alloc_stats.live
        );
    }

    let stats = host.allocator().stats();
    println!(
        "{} live={} allocated={} freed={} double_frees={}",
        "Final allocations:".bold(),
        stats.live,
        stats.total_allocated,
        stats.freed,
        stats.double_frees
    );
    Ok(())
}
