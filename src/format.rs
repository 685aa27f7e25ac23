//! Formatting helpers for task listings.

use std::time::Duration;

use crate::task::Task;

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

/// Formats a task as one listing line, e.g. `#3  downloading  12/40`.
///
/// Finished tasks also show how long they ran.
#[must_use]
pub fn format_task(task: &Task) -> String {
    let line = format!(
        "#{:<4} {:<12} {}/{}",
        task.id, task.state, task.items_done, task.items
    );
    match task.timestamp_done {
        Some(done) => {
            let millis = u64::try_from(done - task.timestamp_started).unwrap_or(0);
            format!("{line}  in {}", format_duration(Duration::from_millis(millis)))
        }
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutcome;

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 01m 05s");
    }

    #[test]
    fn format_duration_subsecond() {
        assert_eq!(format_duration(Duration::from_millis(500)), "0.5s");
    }

    #[test]
    fn running_task_line() {
        let mut task = Task::new(3, (0..40).collect(), 0);
        for _ in 0..12 {
            task.record_item_done();
        }
        assert_eq!(format_task(&task), "#3    downloading  12/40");
    }

    #[test]
    fn finished_task_line_shows_elapsed() {
        let mut task = Task::new(12, vec![1, 2], 1_000);
        task.finish(
            &TaskOutcome {
                task_id: 12,
                downloaded: 2,
                ..TaskOutcome::default()
            },
            66_000,
        );
        assert_eq!(format_task(&task), "#12   completed    2/2  in 1m 05s");
    }

    #[test]
    fn clock_skew_does_not_panic() {
        let mut task = Task::new(1, vec![1], 10_000);
        task.mark_interrupted(5_000);
        assert!(format_task(&task).ends_with("in 0.0s"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn format_duration_never_panics(millis in 0u64..1_000_000_000) {
                let _ = format_duration(Duration::from_millis(millis));
            }

            #[test]
            fn format_task_never_panics(started in any::<i32>(), done in any::<i32>()) {
                let mut task = Task::new(1, vec![1], i64::from(started));
                task.mark_interrupted(i64::from(done));
                let _ = format_task(&task);
            }
        }
    }
}
