//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use delay_lib::evaluation::ClassificationReport;
use delay_lib::predictor::ArtifactMetadata;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a ratio as percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Color a score: green when good, yellow when middling, red otherwise
pub fn color_score(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    if value >= 0.8 {
        formatted.green().to_string()
    } else if value >= 0.6 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

fn class_name(label: i64) -> &'static str {
    if label == 1 {
        "delayed"
    } else {
        "on time"
    }
}

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Support")]
    support: usize,
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn property(key: &str, value: Option<&str>) -> PropertyRow {
    PropertyRow {
        key: key.to_string(),
        value: value.unwrap_or("-").to_string(),
    }
}

/// Render artifact metadata as a two-column table
pub fn print_metadata(metadata: &ArtifactMetadata) {
    println!("{}", "Artifact Metadata".bold());
    let width = metadata.n_features.map(|n| n.to_string());
    let rows = vec![
        property("Producer", Some(metadata.producer.as_str())),
        property("Description", Some(metadata.doc_string.as_str())),
        property("Version", metadata.version.as_deref()),
        property("Classifier", metadata.classifier.as_deref()),
        property(
            "Delay threshold (min)",
            metadata.delay_threshold_minutes.as_deref(),
        ),
        property("Random state", metadata.random_state.as_deref()),
        property("Input width", width.as_deref()),
    ];
    println!("{}", Table::new(rows).with(Style::rounded()));

    if metadata.feature_names.is_empty() {
        print_info("Artifact does not record its feature list");
    } else {
        println!("{}", "Features".bold());
        for (idx, name) in metadata.feature_names.iter().enumerate() {
            println!("  {:>2}. {}", idx + 1, name.cyan());
        }
    }
}

/// Render a classification report like a per-class summary table
pub fn print_report(report: &ClassificationReport) {
    println!("{}", "Classification Report".bold());
    println!("{}", "=".repeat(50));
    println!(
        "Accuracy:     {} ({} rows)",
        color_score(report.accuracy),
        report.total
    );
    println!("Macro F1:     {}", color_score(report.macro_f1));
    println!("Weighted F1:  {}", color_score(report.weighted_f1));
    println!();

    let rows: Vec<ClassRow> = report
        .classes
        .iter()
        .map(|c| ClassRow {
            class: class_name(c.label).to_string(),
            precision: format!("{:.3}", c.precision),
            recall: format!("{:.3}", c.recall),
            f1: format!("{:.3}", c.f1),
            support: c.support,
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let confusion = &report.confusion;
    println!(
        "Confusion:    TN {}  FP {}  FN {}  TP {}",
        confusion.true_negative,
        confusion.false_positive,
        confusion.false_negative,
        confusion.true_positive.to_string().bold()
    );
}
