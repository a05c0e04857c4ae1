//! Output formatting for walk results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::analysis::Interface;
use crate::walker::{display_path, WalkReport};

// =============================================================================
// JSON Format
// =============================================================================

/// JSON report structure.
#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub dir: String,
    pub generated: bool,
    pub files_parsed: usize,
    pub files_excluded: usize,
    pub interfaces_found: usize,
    pub mocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<JsonSkipped>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<JsonParseError>,
}

/// An interface that matched but could not be generated.
#[derive(Serialize, Deserialize)]
pub struct JsonSkipped {
    pub interface: String,
    pub reason: String,
}

/// A file that could not be ingested.
#[derive(Serialize, Deserialize)]
pub struct JsonParseError {
    pub file: String,
    pub message: String,
}

/// Build the JSON view of a walk.
pub fn to_json(dir: &Path, report: &WalkReport) -> JsonReport {
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        dir: dir.to_string_lossy().to_string(),
        generated: report.generated,
        files_parsed: report.files_parsed,
        files_excluded: report.files_excluded,
        interfaces_found: report.interfaces_found,
        mocks: report.dispatched.clone(),
        skipped: report
            .faults
            .iter()
            .map(|(name, fault)| JsonSkipped {
                interface: name.clone(),
                reason: fault.to_string(),
            })
            .collect(),
        parse_errors: report
            .parse_faults
            .iter()
            .map(|(file, err)| JsonParseError {
                file: display_path(file, dir),
                message: err.to_string(),
            })
            .collect(),
    }
}

/// Write results in JSON format.
pub fn write_json<W: Write>(out: &mut W, dir: &Path, report: &WalkReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&to_json(dir, report))?;
    writeln!(out, "{}", json)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty<W: Write>(out: &mut W, dir: &Path, report: &WalkReport) -> std::io::Result<()> {
    // Header
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "mockwalk".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Searching: ".dimmed(), dir.display())?;
    writeln!(
        out,
        "  {}",
        format!(
            "{} files parsed, {} interfaces found",
            report.files_parsed, report.interfaces_found
        )
        .dimmed()
    )?;
    if report.files_excluded > 0 {
        writeln!(
            out,
            "  {}",
            format!("{} files excluded by build constraints", report.files_excluded).dimmed()
        )?;
    }
    writeln!(out)?;

    if !report.dispatched.is_empty() {
        writeln!(out, "  {} ({}):", "Generated".bold(), report.dispatched.len())?;
        for name in &report.dispatched {
            writeln!(out, "    {} {}", "✓".green(), name)?;
        }
        writeln!(out)?;
    }

    if !report.faults.is_empty() {
        writeln!(out, "  {} ({}):", "Skipped".bold(), report.faults.len())?;
        for (name, fault) in &report.faults {
            writeln!(out, "    {} {}", "WARN ".yellow(), name)?;
            writeln!(out, "          {}", fault)?;
        }
        writeln!(out)?;
    }

    if !report.parse_faults.is_empty() {
        writeln!(out, "  {} ({}):", "Parse errors".bold(), report.parse_faults.len())?;
        for (file, err) in &report.parse_faults {
            writeln!(out, "    {} {}", "ERROR".red(), display_path(file, dir).blue())?;
            writeln!(out, "          {}", err)?;
        }
        writeln!(out)?;
    }

    if report.generated {
        writeln!(out, "  {}", "DONE".green())?;
    } else {
        writeln!(out, "  {}", "NOTHING GENERATED".yellow())?;
    }
    writeln!(out)
}

/// Write the interfaces matched by a `list` walk.
pub fn write_listing<W: Write>(out: &mut W, dir: &Path, interfaces: &[Interface]) -> std::io::Result<()> {
    for iface in interfaces {
        let methods = iface.methods.len();
        let plural = if methods != 1 { "s" } else { "" };
        writeln!(
            out,
            "{:<28} {:<40} {}",
            iface.name.bold(),
            iface.package_path,
            format!(
                "{} ({} method{})",
                display_path(&iface.file, dir),
                methods,
                plural
            )
            .dimmed()
        )?;
    }
    Ok(())
}
