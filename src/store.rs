//! Durable progress store.
//!
//! One JSON file per job under `<root>/jobs/`, holding the job together
//! with its task set; completed task payloads land under `<root>/content/`
//! and tasks keep an opaque `result_ref` pointing at them. Every state
//! transition is written here before the in-memory copy is treated as
//! authoritative, which is what lets a fresh process resume from
//! `load_incomplete_jobs` after a crash.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::job::{Job, Task};

#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job: Job,
    tasks: Vec<Task>,
}

pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn open(root: &Path) -> Result<Self, EngineError> {
        fs::create_dir_all(root.join("jobs"))?;
        fs::create_dir_all(root.join("content"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join("jobs").join(format!("{job_id}.json"))
    }

    /// Persist a job and its full task set.
    pub fn save_job(&self, job: &Job, tasks: &[Task]) -> Result<(), EngineError> {
        let record = JobRecord {
            job: job.clone(),
            tasks: tasks.to_vec(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(self.job_path(&job.id), json)?;
        Ok(())
    }

    /// Persist one task transition without touching the job row.
    pub fn save_task(&self, task: &Task) -> Result<(), EngineError> {
        let (job, mut tasks) = self.load_job(&task.job_id)?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.save_job(&job, &tasks)
    }

    pub fn load_job(&self, job_id: &str) -> Result<(Job, Vec<Task>), EngineError> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Err(EngineError::JobNotFound(job_id.to_string()));
        }
        let contents = fs::read_to_string(path)?;
        let record: JobRecord = serde_json::from_str(&contents)?;
        Ok((record.job, record.tasks))
    }

    /// Jobs that have not reached a terminal state, for resumption on
    /// process start.
    pub fn load_incomplete_jobs(&self) -> Result<Vec<Job>, EngineError> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(self.root.join("jobs"))? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(entry.path())?;
            let record: JobRecord = serde_json::from_str(&contents)?;
            if !record.job.status.is_terminal() {
                jobs.push(record.job);
            }
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Write a completed task's payload for the downstream content
    /// collaborator and return the result reference.
    pub fn write_content(
        &self,
        job_id: &str,
        task_id: &str,
        payload: &Value,
    ) -> Result<String, EngineError> {
        let dir = self.root.join("content").join(job_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{task_id}.json"));
        fs::write(&path, serde_json::to_string_pretty(payload)?)?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn read_content(&self, result_ref: &str) -> Result<Value, EngineError> {
        let contents = fs::read_to_string(result_ref)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobConfig, Role, TaskKind, TaskStatus};
    use tempfile::TempDir;

    fn store() -> (TempDir, ProgressStore) {
        let tmp = TempDir::new().unwrap();
        let store = ProgressStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    fn sample_job() -> (Job, Vec<Task>) {
        let job = Job::new(
            "user-1".into(),
            Role::Free,
            JobConfig {
                title: "Persistence".into(),
                ..Default::default()
            },
        );
        let tasks = crate::job::graph::expand(&job);
        (job, tasks)
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_tmp, store) = store();
        let (job, tasks) = sample_job();
        store.save_job(&job, &tasks).unwrap();

        let (loaded, loaded_tasks) = store.load_job(&job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded_tasks.len(), tasks.len());
    }

    #[test]
    fn load_missing_job_is_not_found() {
        let (_tmp, store) = store();
        let err = store.load_job("nope").unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound(_)));
    }

    #[test]
    fn save_task_updates_one_row() {
        let (_tmp, store) = store();
        let (job, tasks) = sample_job();
        store.save_job(&job, &tasks).unwrap();

        let mut task = tasks[0].clone();
        task.mark(TaskStatus::Completed);
        store.save_task(&task).unwrap();

        let (_, loaded_tasks) = store.load_job(&job.id).unwrap();
        let reloaded = loaded_tasks.iter().find(|t| t.id == task.id).unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
        // Siblings untouched.
        assert!(
            loaded_tasks
                .iter()
                .filter(|t| t.id != task.id)
                .all(|t| t.status == TaskStatus::Pending)
        );
    }

    #[test]
    fn load_incomplete_skips_terminal_jobs() {
        let (_tmp, store) = store();

        let (mut done, done_tasks) = sample_job();
        done.mark_completed();
        store.save_job(&done, &done_tasks).unwrap();

        let (queued, queued_tasks) = sample_job();
        store.save_job(&queued, &queued_tasks).unwrap();

        let (mut failed, failed_tasks) = sample_job();
        failed.mark_failed("boom".into());
        store.save_job(&failed, &failed_tasks).unwrap();

        let incomplete = store.load_incomplete_jobs().unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, queued.id);
    }

    #[test]
    fn content_write_then_read() {
        let (_tmp, store) = store();
        let payload = serde_json::json!({"title": "Module one"});
        let result_ref = store.write_content("job-1", "task-1", &payload).unwrap();
        let loaded = store.read_content(&result_ref).unwrap();
        assert_eq!(loaded, payload);
    }

    #[test]
    fn task_kind_survives_persistence() {
        let (_tmp, store) = store();
        let (job, tasks) = sample_job();
        store.save_job(&job, &tasks).unwrap();

        let (_, loaded) = store.load_job(&job.id).unwrap();
        let lesson = loaded
            .iter()
            .find(|t| matches!(t.kind, TaskKind::Lesson { .. }))
            .unwrap();
        assert_eq!(
            lesson.kind,
            TaskKind::Lesson {
                module_index: 0,
                index: 0
            }
        );
    }
}
