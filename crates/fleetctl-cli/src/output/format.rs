//! Output format selection for listing commands, grounded on
//! `mofa-cli::output::{OutputFormat, format_result}`.

use crate::output::Table;
use serde_json::Value;

/// Output format for CLI listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table, same rendering as `Table`.
    #[default]
    Text,
    /// JSON array, for automation.
    Json,
    /// Explicit table rendering (identical to `Text` for this CLI).
    Table,
}

/// Renders a row set in the requested format. `rows` is typically built
/// from `serde_json::json!({...})` objects sharing one key set, the way
/// every listing command in this CLI already constructs its output.
pub fn render_rows(rows: &[Value], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string()),
        OutputFormat::Text | OutputFormat::Table => Table::from_json_array(rows).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_format_round_trips_as_array() {
        let rows = vec![json!({"id": "1", "status": "running"})];
        let out = render_rows(&rows, OutputFormat::Json);
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn text_format_renders_a_table() {
        let rows = vec![json!({"id": "1", "status": "running"})];
        let out = render_rows(&rows, OutputFormat::Text);
        assert!(out.contains("running"));
    }
}
