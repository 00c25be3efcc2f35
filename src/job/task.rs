use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of generation work a job decomposes into.
///
/// Each variant declares, through the methods below, everything the
/// executor needs: call timeout, token budget, degradability and a label
/// used in prompts, cache keys and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Top-level course outline. Everything else depends on it.
    Outline,
    /// One module of the course, derived from the outline.
    Module { index: usize },
    /// One lesson section within a module. The heaviest content kind.
    Lesson { module_index: usize, index: usize },
    /// One assessment for a module.
    Assessment { module_index: usize },
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Outline => "outline",
            TaskKind::Module { .. } => "module",
            TaskKind::Lesson { .. } => "lesson",
            TaskKind::Assessment { .. } => "assessment",
        }
    }

    /// Whether this kind may substitute a placeholder payload when retries
    /// are exhausted. Outline and module results are structural (the rest
    /// of the graph hangs off them) so they hard-fail instead.
    pub fn is_degradable(&self) -> bool {
        matches!(self, TaskKind::Lesson { .. } | TaskKind::Assessment { .. })
    }

    /// Timeout for one service call of this kind. Lessons carry the most
    /// content and get the larger budget.
    pub fn call_timeout(&self) -> Duration {
        match self {
            TaskKind::Lesson { .. } => Duration::from_secs(240),
            _ => Duration::from_secs(120),
        }
    }

    /// Expected wall-clock duration, used to derive the job-level timeout.
    pub fn expected_duration(&self) -> Duration {
        match self {
            TaskKind::Outline => Duration::from_secs(60),
            TaskKind::Module { .. } => Duration::from_secs(90),
            TaskKind::Lesson { .. } => Duration::from_secs(180),
            TaskKind::Assessment { .. } => Duration::from_secs(60),
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            TaskKind::Outline => 2048,
            TaskKind::Module { .. } => 4096,
            TaskKind::Lesson { .. } => 8192,
            TaskKind::Assessment { .. } => 2048,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Outline => write!(f, "outline"),
            TaskKind::Module { index } => write!(f, "module[{index}]"),
            TaskKind::Lesson {
                module_index,
                index,
            } => write!(f, "lesson[{module_index}.{index}]"),
            TaskKind::Assessment { module_index } => write!(f, "assessment[{module_index}]"),
        }
    }
}

/// Tracks the lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, at least one dependency not yet completed.
    Pending,
    /// All dependencies completed, waiting for a worker slot.
    Ready,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Retry behavior for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so 2 = one retry).
    pub max_attempts: u32,
    /// Fixed delay before the retry.
    pub retry_delay_ms: u64,
    /// Hard ceiling for the whole task including retries.
    pub task_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay_ms: 5000,
            task_timeout_secs: 600,
        }
    }
}

/// One unit of generation work belonging to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub job_id: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Task ids that must be `Completed` before this task may run.
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Opaque handle to where the generated content was written.
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(job_id: &str, kind: TaskKind, depends_on: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            kind,
            depends_on,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            result_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
