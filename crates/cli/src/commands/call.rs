use anyhow::Result;
use colored::*;
use recalc_addin_protocol::{HostApi, Target, Variant};
use recalc_core::Host;

use super::parse_arg;

pub fn execute(host: &Host, function: &str, raw_args: &[String]) -> Result<()> {
    let args: Vec<Variant> = raw_args.iter().map(|raw| parse_arg(raw)).collect();

    match host.dispatch(&Target::from(function), &args) {
        Ok(dispatched) => {
            let ownership = if dispatched.must_release {
                "owned".yellow()
            } else {
                "borrowed".bright_black()
            };
            println!(
                "{} = {}  [{}]",
                function.cyan().bold(),
                dispatched.value.to_string().green(),
                ownership
            );
            if dispatched.must_release {
                // The free-callback obligation sits with us, the caller.
                host.free(&dispatched.value);
            }
        }
        Err(err) => println!("{} {}", "error:".red().bold(), err),
    }

    let stats = host.allocator().stats();
    println!(
        "{} live={} allocated={} freed={} double_frees={}",
        "allocations:".bright_black(),
        stats.live,
        stats.total_allocated,
        stats.freed,
        stats.double_frees
    );
    Ok(())
}
