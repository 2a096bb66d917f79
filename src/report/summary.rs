//! Training summary table

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::lineage::{RunSummary, UNKNOWN_HASH};

/// R² above which the test score is shown in green
const GOOD_R2: f64 = 0.8;

/// Metric and lineage table for a finished run
pub fn build_summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Train").add_attribute(Attribute::Bold),
        Cell::new("Test").add_attribute(Attribute::Bold),
    ]);

    for name in ["mae", "rmse", "r2"] {
        let value = |prefix: &str| {
            summary
                .metrics
                .get(&format!("{}_{}", prefix, name))
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string())
        };
        let mut test_cell = Cell::new(value("test"));
        if name == "r2" {
            let good = summary.metrics.get("test_r2").is_some_and(|r2| *r2 >= GOOD_R2);
            test_cell = test_cell
                .fg(if good { Color::Green } else { Color::Yellow })
                .add_attribute(Attribute::Bold);
        }
        table.add_row(vec![Cell::new(name.to_uppercase()), Cell::new(value("train")), test_cell]);
    }
    table
}

/// Identifiers that tie the registered version back to its inputs
pub fn build_lineage_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Lineage").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec![Cell::new("Run"), Cell::new(&summary.run_id)]);
    table.add_row(vec![
        Cell::new("Model"),
        Cell::new(format!("{} v{}", summary.model_name, summary.version))
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new("Alias"), Cell::new(&summary.alias).fg(Color::Cyan)]);
    table.add_row(vec![
        Cell::new("Data hash"),
        Cell::new(&summary.data_hash).fg(if summary.data_hash == UNKNOWN_HASH {
            Color::Red
        } else {
            Color::White
        }),
    ]);
    table.add_row(vec![
        Cell::new("Rows (train / test)"),
        Cell::new(format!("{} / {}", summary.train_rows, summary.test_rows)),
    ]);
    table.add_row(vec![Cell::new("Boosting iterations"), Cell::new(summary.n_iter)]);

    let total: f64 = summary.timings.iter().map(|t| t.seconds).sum();
    table.add_row(vec![Cell::new("Total time"), Cell::new(format!("{:.2}s", total))]);
    table
}

/// Print both tables, indented to line up with the step output
pub fn display_run_summary(summary: &RunSummary) {
    println!();
    println!("    {} {}", style("📋").cyan(), style("TRAINING SUMMARY").white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();

    for table in [build_summary_table(summary), build_lineage_table(summary)] {
        for line in table.to_string().lines() {
            println!("    {}", line);
        }
        println!();
    }
}
