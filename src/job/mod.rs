pub mod graph;
pub mod job;
pub mod task;

pub use job::{Job, JobConfig, JobStatus, Role};
pub use task::{RetryPolicy, Task, TaskKind, TaskStatus};
