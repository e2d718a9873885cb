//! Terminal styling for `mapfile` output.
//!
//! Lookup results go to stdout unstyled so they can be piped; only status
//! lines and headings pass through here.

use console::{Style, StyledObject};

fn marked(mark: StyledObject<&str>, msg: &str) -> String {
    format!("{mark} {msg}")
}

/// Validation passed.
pub fn success(msg: &str) -> String {
    marked(Style::new().green().bold().apply_to("ok"), msg)
}

/// A problem that makes `validate` fail.
pub fn error(msg: &str) -> String {
    marked(Style::new().red().bold().apply_to("error:"), msg)
}

/// Something worth a look that does not fail validation, e.g. duplicate keys.
pub fn warn(msg: &str) -> String {
    marked(Style::new().yellow().bold().apply_to("warning:"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().underlined().apply_to(msg).to_string()
}

/// Secondary text such as "not found" on a missed lookup.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}
