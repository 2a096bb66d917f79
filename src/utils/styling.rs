//! Terminal styling for the CLI

use std::path::Path;
use std::time::Duration;

use console::{style, Emoji};

pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TAG: Emoji<'_, '_> = Emoji("🏷️  ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
    _                                       _
   | |__   ___  _   _ ___  ___  ___ __ _ ___| |_
   | '_ \ / _ \| | | / __|/ _ \/ __/ _` / __| __|
   | | | | (_) | |_| \__ \  __/ (_| (_| \__ \ |_
   |_| |_|\___/ \__,_|___/\___|\___\__,_|___/\__|
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {}",
        style("California housing price models, trained and served").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the training configuration card
pub fn print_train_config(data: &Path, tracking_root: &Path, experiment: &str, model: &str, alias: &str) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!("    │ {:<width$}│", style("Configuration").cyan().bold(), width = box_width - 3);
    println!("    ├{}┤", line);
    println!("    │  {}Data:       {:<36}│", FOLDER, truncate_path(data, 36));
    println!("    │  {}Tracking:   {:<36}│", SAVE, truncate_path(tracking_root, 36));
    println!("    │  {}Experiment: {:<36}│", CHART, truncate_string(experiment, 36));
    println!(
        "    │  {}Model:      {:<36}│",
        TAG,
        truncate_string(&format!("{}@{}", model, alias), 36)
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: usize, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

pub fn print_step_time(elapsed: Duration) {
    println!("      {}", style(format!("⏱  {:.2}s", elapsed.as_secs_f64())).dim());
}

/// Print the final completion message
pub fn print_completion(message: &str) {
    println!();
    println!("    {} {}", ROCKET, style(message).green().bold());
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    truncate_string(&path.display().to_string(), max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string_keeps_tail() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("data/raw/housing.csv", 10), "...ing.csv");
    }
}
