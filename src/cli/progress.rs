//! Progress bars and summaries for CLI downloads.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::download::BatchReport;
use crate::format::format_task;
use crate::task::{Task, TaskState};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Spinner shown while search pages are being collected.
pub fn make_search_spinner(query: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} Collecting \"{msg}\" ({elapsed})")
            .expect("progress template is valid"),
    );
    bar.set_message(query.to_string());
    bar
}

/// Progress bar for one task's items.
pub fn make_task_bar(task: &Task) -> ProgressBar {
    let bar = ProgressBar::new(task.items as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos}/{len} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_prefix(format!("Task #{}", task.id));
    bar
}

/// Mirrors a task snapshot onto its bar.
pub fn update_task_bar(bar: &ProgressBar, task: &Task) {
    bar.set_position(task.items_done as u64);
    bar.set_message(task.state.to_string());
}

fn styled_line(task: &Task) -> String {
    let line = format_task(task);
    match task.state {
        TaskState::Completed => style(line).green().to_string(),
        TaskState::Failed => style(line).red().to_string(),
        TaskState::Canceled => style(line).yellow().to_string(),
        TaskState::Preparing | TaskState::Downloading => line,
    }
}

/// Prints every known task, one per line.
pub fn print_task_list(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    for task in tasks {
        println!("  {}", styled_line(task));
    }
}

/// Prints the outcome of a finished batch.
pub fn print_summary(report: &BatchReport) {
    let outcome = &report.outcome;

    println!("\n{SEPARATOR}");
    match &report.task {
        Some(task) => println!("{}", styled_line(task)),
        None => println!("Task #{} was removed", outcome.task_id),
    }
    println!("{SEPARATOR}");
    println!("  Downloaded:  {}", outcome.downloaded);
    if outcome.skipped > 0 {
        println!("  Skipped:     {} (already downloaded)", outcome.skipped);
    }
    if outcome.failed > 0 {
        println!("  Failed:      {}", outcome.failed);
    }
    if outcome.canceled {
        println!("  Canceled, dispatched posts were rolled back");
    }
    println!("{SEPARATOR}");
}
