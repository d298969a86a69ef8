// Output formatting and display for CLI

use crate::supervisor::{PassReport, ScriptOutcome, ScriptSummary};
use colored::*;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print the outcome of a supervision pass
pub fn print_report(report: &PassReport) {
    for result in &report.results {
        match result.outcome {
            ScriptOutcome::Restarted { pid } => {
                println!(
                    "{} {} restarted (pid {})",
                    "↻".yellow().bold(),
                    result.name.cyan(),
                    pid
                );
            }
            ScriptOutcome::Failed { ref error } => {
                println!("{} {} {}", "✗".red().bold(), result.name.cyan(), error.red());
            }
            ScriptOutcome::Healthy | ScriptOutcome::Skipped => {}
        }
    }

    if report.has_changes() {
        println!(
            "{}",
            format!(
                "{} restarted, {} failed",
                report.restart_count(),
                report.failure_count()
            )
            .dimmed()
            .italic()
        );
    } else {
        println!("{}", "Nothing happened".dimmed());
    }
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a formatted table of scripts
pub fn print_script_table(scripts: &[ScriptSummary]) {
    if scripts.is_empty() {
        println!("{}", "No scripts are configured".yellow());
        return;
    }

    #[derive(Tabled)]
    struct ScriptRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Active")]
        active: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "Timeout")]
        timeout: String,
        #[tabled(rename = "Last Launch")]
        last_date: String,
    }

    let rows: Vec<ScriptRow> = scripts
        .iter()
        .map(|s| ScriptRow {
            name: truncate(&s.name, 24),
            active: if s.active { "yes" } else { "no" }.to_string(),
            state: format_state_colored(s),
            pid: s
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
            timeout: s
                .timeout
                .map(|t| format!("{}s", t))
                .unwrap_or_else(|| "-".to_string()),
            last_date: s
                .last_date
                .as_deref()
                .map(|d| d.chars().take(19).collect())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} script(s)", scripts.len())
            .dimmed()
            .italic()
    );
}

fn state_label(script: &ScriptSummary) -> &'static str {
    match (script.active, script.running) {
        (_, true) => "running",
        (true, false) => "stopped",
        (false, false) => "inactive",
    }
}

fn format_state_colored(script: &ScriptSummary) -> String {
    let label = state_label(script);
    match label {
        "running" => label.green().to_string(),
        "stopped" => label.red().bold().to_string(),
        _ => label.bright_black().to_string(),
    }
}

/// Truncate a string to a maximum length
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(active: bool, running: bool) -> ScriptSummary {
        ScriptSummary {
            name: "job".to_string(),
            active,
            pid: None,
            running,
            last_date: None,
            timeout: None,
        }
    }

    #[test]
    fn test_state_label() {
        assert_eq!(state_label(&summary(true, true)), "running");
        assert_eq!(state_label(&summary(true, false)), "stopped");
        assert_eq!(state_label(&summary(false, false)), "inactive");
        assert_eq!(state_label(&summary(false, true)), "running");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
    }
}
