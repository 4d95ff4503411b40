use anyhow::Result;
use colored::*;
use recalc_addin_protocol::CallingConvention;
use recalc_core::Host;
use serde_json::json;

pub fn execute(host: &Host, json_output: bool) -> Result<()> {
    let entries = host.registry().entries();

    if json_output {
        let rows: Vec<_> = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id.0,
                    "convention": entry.registration.convention.as_str(),
                    "spec": entry.registration.spec,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}", "Registered functions:".bold());
    for entry in entries {
        let spec = &entry.registration.spec;
        let convention = match entry.registration.convention {
            CallingConvention::Managed => "managed".green(),
            CallingConvention::Leaky => "leaky".red(),
        };
        println!(
            "  {:>5}  {:<22}  {:<6}  {:<8}  {}",
            entry.id.to_string().bright_black(),
            spec.name.cyan().bold(),
            spec.signature.bright_black(),
            convention,
            spec.help_text.bright_black()
        );
    }
    Ok(())
}
