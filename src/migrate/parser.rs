//! Schema script parsing.
//!
//! A script is split into statements line by line:
//! - a line starting with `--` is a comment and is dropped
//! - a blank line ends the current statement
//! - every other line is appended to the current statement with a `\n`

use std::io::BufRead;
use tracing::warn;

const VERSION_MARKER: &str = "schema_";
const SCRIPT_SUFFIX: &str = ".sql";

/// Version encoded in a schema script path (`.../schema_<version>.sql`).
pub fn schema_version(path: &str) -> Option<&str> {
    let start = path.rfind(VERSION_MARKER)? + VERSION_MARKER.len();
    let version = path[start..].strip_suffix(SCRIPT_SUFFIX)?;
    (!version.is_empty()).then_some(version)
}

/// Split a schema script into statements, in file order.
///
/// A read error stops parsing; statements read up to that point are kept.
pub fn parse_statements<R: BufRead>(reader: R) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Schema script read failed");
                break;
            }
        };

        if line.starts_with("--") {
            continue;
        }
        if line.trim().is_empty() {
            flush(&mut statements, &mut current);
        } else {
            current.push_str(&line);
            current.push('\n');
        }
    }
    flush(&mut statements, &mut current);

    statements
}

fn flush(statements: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        statements.push(std::mem::take(current));
    }
}
