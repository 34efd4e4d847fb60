//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use rolecheck::{InstanceReport, Phase, SuiteReport};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    /// Formats whose stdout must stay parseable as a single document
    pub fn is_machine_readable(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Yaml)
    }
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for InstanceReport {
    fn headers() -> Vec<&'static str> {
        vec![
            "Scenario", "Account", "Role", "Status", "Checks", "Evidence", "Duration", "Error",
        ]
    }

    fn row(&self) -> Vec<String> {
        let passed_checks = self.results.iter().filter(|r| r.passed).count();
        vec![
            self.scenario.clone(),
            self.account.clone(),
            self.role.clone().unwrap_or_else(|| "-".to_string()),
            status(self.phase),
            format!("{}/{}", passed_checks, self.results.len()),
            self.evidence.len().to_string(),
            format!("{}ms", self.duration_ms),
            self.error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_default(),
        ]
    }
}

fn status(phase: Phase) -> String {
    match phase {
        Phase::Done => "✓ passed".to_string(),
        Phase::Failed => "✗ failed".to_string(),
        other => format!("{other:?}"),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() && !format.is_machine_readable() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print the per-instance table followed by a one-line summary
pub fn print_suite(report: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(report).unwrap_or_default());
        }
        OutputFormat::Table | OutputFormat::Plain => {
            print_list(&report.results, format);
            println!();
            println!("{}", summary_line(report));
        }
    }
}

fn summary_line(report: &SuiteReport) -> String {
    let passed = format!("{} passed", report.passed);
    let failed = format!("{} failed", report.failed);
    format!(
        "{} {}, {} of {} in {:.1}s",
        if report.success() { "✓".green() } else { "✗".red() },
        passed.green(),
        if report.failed > 0 { failed.red().bold() } else { failed.normal() },
        report.total,
        report.duration_ms as f64 / 1000.0
    )
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

/// Print a status notice alongside a report, on stderr when stdout carries
/// JSON or YAML
pub fn print_notice(message: &str, format: OutputFormat) {
    if format.is_machine_readable() {
        eprintln!("ℹ️  {}", message);
    } else {
        print_info(message);
    }
}
