//! Output formatting: JSON lines or pretty JSON on stdout.

use std::io::{self, Write};

use serde_json::{Value, json};
use unifi_events::BusEvent;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a JSON value in the chosen format, without a trailing newline.
pub fn render_json(format: OutputFormat, value: &Value) -> String {
    let rendered = match format {
        OutputFormat::JsonLines => serde_json::to_string(value),
        OutputFormat::Json => serde_json::to_string_pretty(value),
    };
    rendered.unwrap_or_else(|e| format!("\"<serialization error: {e}>\""))
}

/// Stream events wrap their payload with the topic they were published under.
pub fn event_json(event: &BusEvent) -> Value {
    json!({ "topic": event.topic, "payload": event.payload.as_ref() })
}

/// Write one document to stdout.
pub fn print(format: OutputFormat, value: &Value) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", render_json(format, value))?;
    out.flush()?;
    Ok(())
}
