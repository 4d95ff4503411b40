pub mod call;
pub mod hammer;
pub mod list;
pub mod run;

use recalc_addin_protocol::Variant;

/// Parse a command-line argument: numbers where they parse, text otherwise.
pub fn parse_arg(raw: &str) -> Variant {
    raw.parse::<f64>()
        .map(Variant::num)
        .unwrap_or_else(|_| Variant::text(raw))
}
