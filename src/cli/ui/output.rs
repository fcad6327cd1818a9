use console::style;

use crate::types::Provenance;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// One `key  value` row, key padded to `width`
    pub fn entry(&self, key: &str, value: &str, width: usize) {
        println!("  {:<width$}  {}", style(key).cyan(), value, width = width);
    }

    /// Key with the source that supplied it
    pub fn source(&self, key: &str, source: &Provenance, width: usize) {
        let label = match source {
            Provenance::Override(_) => style(format!("override {}", source)).yellow(),
            Provenance::File(_) => style(source.to_string()).dim(),
            Provenance::Environment | Provenance::Computed => style(source.to_string()).magenta(),
        };
        println!("  {:<width$}  {}", key, label, width = width);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
