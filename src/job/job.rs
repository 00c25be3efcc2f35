use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quota tier of the identity that submitted a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Low-privilege tier with tight quotas.
    Free,
    /// Elevated tier with higher ceilings.
    Premium,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Free => write!(f, "free"),
            Role::Premium => write!(f, "premium"),
        }
    }
}

/// Structural parameters for one course-generation run.
///
/// The orchestrator reads only what it needs to expand the task graph
/// (module/lesson counts, assessment toggle); everything else is passed
/// through into the generation prompts untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Course topic/title supplied by the user.
    pub title: String,
    /// Intended audience, free text.
    #[serde(default)]
    pub audience: Option<String>,
    /// Target course length in weeks.
    #[serde(default = "default_duration_weeks")]
    pub duration_weeks: u32,
    /// Requested depth: "introductory", "intermediate" or "advanced".
    #[serde(default = "default_depth")]
    pub depth: String,
    /// Number of modules to generate.
    #[serde(default = "default_module_count")]
    pub module_count: usize,
    /// Number of lesson sections per module.
    #[serde(default = "default_lessons_per_module")]
    pub lessons_per_module: usize,
    /// Whether to generate one assessment per module.
    #[serde(default)]
    pub include_assessments: bool,
}

fn default_duration_weeks() -> u32 {
    4
}

fn default_depth() -> String {
    "intermediate".to_string()
}

fn default_module_count() -> usize {
    4
}

fn default_lessons_per_module() -> usize {
    3
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            audience: None,
            duration_weeks: default_duration_weeks(),
            depth: default_depth(),
            module_count: default_module_count(),
            lessons_per_module: default_lessons_per_module(),
            include_assessments: false,
        }
    }
}

/// Tracks the lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One user-requested course-generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner: String,
    pub role: Role,
    pub config: JobConfig,
    pub status: JobStatus,
    /// Percentage of tasks completed, 0-100. Never decreases.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable summary of the terminal failure, if any.
    pub error: Option<String>,
}

impl Job {
    pub fn new(owner: String, role: Role, config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            role,
            config,
            status: JobStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    /// Record a new progress percentage. Regressions are ignored so the
    /// reported value is monotonically non-decreasing.
    pub fn set_progress(&mut self, pct: u8) {
        if pct > self.progress {
            self.progress = pct.min(100);
            self.updated_at = Utc::now();
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    pub fn mark_failed(&mut self, summary: String) {
        self.status = JobStatus::Failed;
        self.error = Some(summary);
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}
