//! Terminal output: a spinner while a job is being driven and colored
//! summaries once it settles.
//!
//! Uses `indicatif` for the spinner and `console` for styling. All of
//! the engine's real observability goes through the event log; this is
//! only what an operator watching the terminal sees.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{Job, JobStatus, Task, TaskStatus};

/// Visual progress indicator for one running job.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl JobProgress {
    /// Start the spinner with the course title and return the handle.
    pub fn start(title: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("generating: {title}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Stop the spinner and print the terminal outcome of the job.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        match job.status {
            JobStatus::Completed => {
                println!(
                    "  {} course generated ({}% of tasks completed)",
                    self.green.apply_to("✓"),
                    job.progress
                );
            }
            JobStatus::Failed => {
                println!(
                    "  {} job failed: {}",
                    self.red.apply_to("✗"),
                    job.error.as_deref().unwrap_or("unknown failure")
                );
            }
            _ => {
                println!("  job is {} at {}%", job.status, job.progress);
            }
        }
    }
}

/// Print the persisted state of a job and each of its tasks.
pub fn print_status(job: &Job, tasks: &[Task]) {
    let green = Style::new().green();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    println!();
    println!("job {} — {}", job.id, job.config.title);
    println!("  status: {}  progress: {}%", job.status, job.progress);
    if let Some(error) = &job.error {
        println!("  error: {error}");
    }

    for task in tasks {
        let mark = match task.status {
            TaskStatus::Completed => green.apply_to("✓"),
            TaskStatus::Failed => red.apply_to("✗"),
            TaskStatus::Running => yellow.apply_to("→"),
            _ => yellow.apply_to("·"),
        };
        println!(
            "  {mark} {:<16} {} (attempts: {})",
            task.kind.to_string(),
            task.status,
            task.attempts
        );
        if let Some(err) = &task.last_error {
            println!("      {err}");
        }
    }
}
