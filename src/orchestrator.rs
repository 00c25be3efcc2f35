//! Top-level coordinator.
//!
//! `submit` admits a job through the rate limiter and persists it;
//! `run` expands the task graph once, then drives ready tasks onto a
//! bounded pool of executor futures, persisting every transition so a
//! fresh process can pick up where a dead one stopped. Every scheduling
//! decision is derived from persisted task statuses, never from state
//! that only lives in memory.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::time::timeout;

use crate::breaker::CircuitBreaker;
use crate::cache::ContentCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::TaskExecutor;
use crate::genai::TextGenerator;
use crate::job::{graph, Job, JobConfig, Role, Task, TaskStatus};
use crate::limiter::RateLimiter;
use crate::logger::{EventLog, LogEntry, Severity};
use crate::store::ProgressStore;

pub struct Orchestrator<C: TextGenerator> {
    client: C,
    config: EngineConfig,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    cache: ContentCache,
    store: ProgressStore,
    log: EventLog,
    /// Jobs currently being driven by this process. Guards `run` against
    /// duplicate dispatch; persisted status guards everything else.
    active: Mutex<HashSet<String>>,
}

impl<C: TextGenerator> Orchestrator<C> {
    pub fn new(client: C, config: EngineConfig) -> Result<Self, EngineError> {
        let root = Path::new(&config.state_dir);
        let store = ProgressStore::open(root)?;
        let log = EventLog::open(root, config.alert_severity)?;
        let limiter = RateLimiter::new(config.max_concurrent_jobs);
        let breaker = CircuitBreaker::new(
            config.breaker_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        );
        let cache = ContentCache::new(Duration::from_secs(config.cache_ttl_secs));
        Ok(Self {
            client,
            config,
            limiter,
            breaker,
            cache,
            store,
            log,
            active: Mutex::new(HashSet::new()),
        })
    }

    /// Admit and enqueue a new job. Nothing is persisted on refusal.
    pub fn submit(
        &self,
        owner: &str,
        role: Role,
        config: JobConfig,
    ) -> Result<Job, EngineError> {
        self.limiter.try_admit(owner, role)?;

        let job = Job::new(owner.to_string(), role, config);
        if let Err(err) = self.store.save_job(&job, &[]) {
            self.limiter.release(owner);
            return Err(err);
        }
        let running = self.limiter.running_for(owner);
        self.log.info(
            &job.id,
            format!("job submitted by {owner} ({role}), {running} running"),
        )?;
        Ok(job)
    }

    /// Drive a job to a terminal state. Calling this on a job already
    /// being driven is a no-op that returns the persisted state.
    pub async fn run(&self, job_id: &str) -> Result<Job, EngineError> {
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if !active.insert(job_id.to_string()) {
                let (job, _) = self.store.load_job(job_id)?;
                return Ok(job);
            }
        }
        let result = self.drive(job_id).await;
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
        result
    }

    /// Reload every incomplete job from the store and drive each to a
    /// terminal state, deriving ready-sets purely from persisted statuses.
    pub async fn resume(&self) -> Result<Vec<Job>, EngineError> {
        let pending = self.store.load_incomplete_jobs()?;
        let mut finished = Vec::with_capacity(pending.len());
        for job in pending {
            finished.push(self.run(&job.id).await?);
        }
        Ok(finished)
    }

    /// Current persisted state of a job, straight from the store.
    pub fn status(&self, job_id: &str) -> Result<(Job, Vec<Task>), EngineError> {
        self.store.load_job(job_id)
    }

    async fn drive(&self, job_id: &str) -> Result<Job, EngineError> {
        let (mut job, mut task_list) = self.store.load_job(job_id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }

        // Expansion happens exactly once; a re-run or a resumed process
        // reloads the persisted graph instead of re-creating it.
        if task_list.is_empty() {
            task_list = graph::expand(&job);
            self.store.save_job(&job, &task_list)?;
            self.log.info(
                &job.id,
                format!("task graph expanded: {} tasks", task_list.len()),
            )?;
        }

        let mut tasks: HashMap<String, Task> = task_list
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        // Resume bookkeeping: reload completed payloads for dependents,
        // and put tasks a dead process left mid-flight back into the pool.
        let mut results: HashMap<String, Value> = HashMap::new();
        for task in tasks.values() {
            if task.status == TaskStatus::Completed
                && let Some(result_ref) = &task.result_ref
            {
                results.insert(task.id.clone(), self.store.read_content(result_ref)?);
            }
        }
        let mut requeued = 0;
        for task in tasks.values_mut() {
            if matches!(task.status, TaskStatus::Ready | TaskStatus::Running) {
                task.mark(TaskStatus::Pending);
                requeued += 1;
            }
        }
        if requeued > 0 {
            self.log.warning(
                &job.id,
                format!("{requeued} tasks were mid-flight in a previous run, requeued"),
            )?;
        }

        job.mark_running();
        self.persist(&job, &tasks)?;

        let budget = self.job_budget(&tasks);
        let outcome = timeout(budget, self.schedule(&mut job, &mut tasks, &mut results)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                job.mark_failed(format!("orchestration failure: {err}"));
                self.log.error(&job.id, format!("orchestration failure: {err}"))?;
            }
            Err(_elapsed) => {
                for task in tasks.values_mut() {
                    if task.status != TaskStatus::Completed {
                        task.last_error = Some("job timeout".into());
                        task.mark(TaskStatus::Failed);
                    }
                }
                job.mark_failed(format!("job timed out after {}s", budget.as_secs()));
                self.log
                    .error(&job.id, format!("job timed out after {}s", budget.as_secs()))?;
            }
        }

        self.persist(&job, &tasks)?;
        if job.status.is_terminal() {
            self.limiter.release(&job.owner);
        }
        Ok(job)
    }

    /// Ready-set scheduling over a bounded pool of in-flight executor
    /// futures. After a hard task failure no new tasks are dispatched,
    /// but tasks already in flight are allowed to finish.
    async fn schedule(
        &self,
        job: &mut Job,
        tasks: &mut HashMap<String, Task>,
        results: &mut HashMap<String, Value>,
    ) -> Result<(), EngineError> {
        let executor = TaskExecutor::new(
            &self.client,
            &self.cache,
            &self.breaker,
            self.config.retry_policy(),
        );
        let executor = &executor;
        let total = tasks.len().max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut halted = false;

        loop {
            if !halted {
                for id in graph::ready_ids(tasks) {
                    if in_flight.len() >= self.config.per_job_concurrency {
                        break;
                    }
                    let deps: Vec<Value> = match tasks.get(&id) {
                        Some(task) => task
                            .depends_on
                            .iter()
                            .map(|dep| results.get(dep).cloned().unwrap_or(Value::Null))
                            .collect(),
                        None => continue,
                    };
                    let Some(task) = tasks.get_mut(&id) else {
                        continue;
                    };
                    task.mark(TaskStatus::Ready);
                    self.store.save_task(task)?;
                    task.mark(TaskStatus::Running);
                    self.store.save_task(task)?;
                    self.log.log(
                        LogEntry::new(
                            &job.id,
                            Severity::Info,
                            format!("dispatching {}", task.kind),
                        )
                        .with_task(&task.id),
                    )?;

                    let snapshot = task.clone();
                    let job_snapshot = job.clone();
                    in_flight.push(async move {
                        let outcome = executor.execute(&job_snapshot, &snapshot, &deps).await;
                        (snapshot.id.clone(), outcome)
                    });
                }
            }

            let Some((task_id, outcome)) = in_flight.next().await else {
                break;
            };

            match outcome {
                Ok(run) => {
                    let result_ref = self.store.write_content(&job.id, &task_id, &run.payload)?;
                    if let Some(task) = tasks.get_mut(&task_id) {
                        task.attempts += run.attempts;
                        task.result_ref = Some(result_ref);
                        task.mark(TaskStatus::Completed);
                        self.store.save_task(task)?;

                        if run.degraded {
                            self.log.log(
                                LogEntry::new(
                                    &job.id,
                                    Severity::Warning,
                                    format!("{} exhausted retries, placeholder substituted", task.kind),
                                )
                                .with_task(&task_id),
                            )?;
                        } else if run.from_cache {
                            self.log.log(
                                LogEntry::new(
                                    &job.id,
                                    Severity::Info,
                                    format!("{} served from cache", task.kind),
                                )
                                .with_task(&task_id),
                            )?;
                        }
                    }
                    results.insert(task_id, run.payload);
                }
                Err(failure) => {
                    let kind_label = tasks
                        .get(&task_id)
                        .map(|t| t.kind.to_string())
                        .unwrap_or_else(|| "task".to_string());
                    if let Some(task) = tasks.get_mut(&task_id) {
                        task.attempts += failure.attempts;
                        task.last_error = Some(failure.error.to_string());
                        task.mark(TaskStatus::Failed);
                        self.store.save_task(task)?;
                    }
                    self.log
                        .error(&job.id, format!("{kind_label} failed: {}", failure.error))?;
                    job.mark_failed(format!("{kind_label} failed: {}", failure.error));
                    halted = true;
                }
            }

            let completed = tasks
                .values()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();
            job.set_progress(((completed * 100) / total) as u8);
            self.persist(job, tasks)?;
        }

        if !halted && tasks.values().all(|t| t.status == TaskStatus::Completed) {
            job.mark_completed();
            self.log.info(&job.id, "job completed")?;
        } else if !job.status.is_terminal() {
            // Ready-set dried up with work remaining (e.g. dependents of
            // a failed task).
            job.mark_failed("job halted before all tasks completed".into());
        }
        Ok(())
    }

    /// Job-level timeout: summed expected task durations with margin,
    /// unless overridden in configuration.
    fn job_budget(&self, tasks: &HashMap<String, Task>) -> Duration {
        if let Some(secs) = self.config.job_timeout_secs {
            return Duration::from_secs(secs);
        }
        let expected: Duration = tasks
            .values()
            .map(|t| t.kind.expected_duration())
            .sum();
        expected * self.config.job_timeout_margin.max(1)
    }

    fn persist(&self, job: &Job, tasks: &HashMap<String, Task>) -> Result<(), EngineError> {
        let mut list: Vec<Task> = tasks.values().cloned().collect();
        list.sort_by_key(|t| t.created_at);
        self.store.save_job(job, &list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::{GenAiError, GenerateRequest, GenerateResponse, Usage};
    use crate::job::{JobStatus, TaskKind};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Returns schema-valid content for whatever kind is requested and
    /// records the order of calls by task label.
    struct KindMock {
        calls: StdMutex<Vec<String>>,
        /// Task labels that should always produce an invalid payload.
        invalid: Vec<&'static str>,
    }

    impl KindMock {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                invalid: Vec::new(),
            }
        }

        fn invalid_for(labels: &[&'static str]) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                invalid: labels.to_vec(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn payload_for(label: &str) -> serde_json::Value {
            match label {
                "outline" => serde_json::json!({
                    "title": "Practical Rust",
                    "summary": "A hands-on course covering ownership, traits and async programming in Rust.",
                    "depth": "intermediate",
                    "modules": ["Ownership", "Traits"],
                }),
                "module" => serde_json::json!({
                    "title": "Ownership",
                    "overview": "Why ownership exists, how moves and borrows work, and what the borrow checker enforces.",
                    "objectives": ["Explain moves", "Use borrows correctly"],
                }),
                "lesson" => serde_json::json!({
                    "title": "Borrowing rules",
                    "body": "b".repeat(260),
                    "key_points": ["One mutable borrow at a time", "Borrows must not outlive the owner"],
                }),
                _ => serde_json::json!({
                    "title": "Module checkpoint",
                    "questions": ["Q1", "Q2", "Q3"],
                }),
            }
        }
    }

    impl TextGenerator for KindMock {
        async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenAiError> {
            self.calls.lock().unwrap().push(req.task.clone());
            let text = if self.invalid.contains(&req.task.as_str()) {
                serde_json::json!({"title": "x"}).to_string()
            } else {
                Self::payload_for(&req.task).to_string()
            };
            Ok(GenerateResponse {
                id: "gen_mock".into(),
                text,
                model: "mock".into(),
                usage: Usage {
                    input_tokens: 1,
                    output_tokens: 1,
                },
            })
        }
    }

    /// Never answers within any reasonable test budget.
    struct SleepyMock;

    impl TextGenerator for SleepyMock {
        async fn generate(&self, _req: &GenerateRequest) -> Result<GenerateResponse, GenAiError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep outlives every test")
        }
    }

    fn test_config(tmp: &TempDir) -> EngineConfig {
        EngineConfig {
            state_dir: tmp.path().to_string_lossy().into_owned(),
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn course_config(modules: usize, lessons: usize) -> JobConfig {
        JobConfig {
            title: "Practical Rust".into(),
            module_count: modules,
            lessons_per_module: lessons,
            include_assessments: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn end_to_end_happy_path_schedules_in_dependency_order() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();

        let job = orch
            .submit("user-1", Role::Free, course_config(2, 2))
            .unwrap();
        let finished = orch.run(&job.id).await.unwrap();

        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.progress, 100);

        let (_, tasks) = orch.status(&job.id).unwrap();
        assert_eq!(tasks.len(), 7);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
        assert!(tasks.iter().all(|t| t.result_ref.is_some()));

        // Outline first and alone, then both modules, then the lessons.
        let calls = orch.client.calls();
        assert_eq!(calls.len(), 7);
        assert_eq!(calls[0], "outline");
        assert_eq!(&calls[1..3], &["module", "module"]);
        assert!(calls[3..].iter().all(|c| c == "lesson"));
    }

    #[tokio::test]
    async fn rerunning_a_finished_job_makes_no_new_calls() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();

        orch.run(&job.id).await.unwrap();
        let first_calls = orch.client.calls().len();

        let again = orch.run(&job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Completed);
        assert_eq!(orch.client.calls().len(), first_calls);

        let (_, tasks) = orch.status(&job.id).unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_run_calls_do_not_duplicate_dispatch() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(2, 2))
            .unwrap();

        let (a, b) = tokio::join!(orch.run(&job.id), orch.run(&job.id));
        a.unwrap();
        b.unwrap();

        // Seven tasks, seven calls, regardless of which caller won.
        assert_eq!(orch.client.calls().len(), 7);
    }

    #[tokio::test]
    async fn degradable_validation_failures_complete_with_placeholders() {
        let tmp = TempDir::new().unwrap();
        let orch =
            Orchestrator::new(KindMock::invalid_for(&["lesson"]), test_config(&tmp)).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();

        let finished = orch.run(&job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);

        // Two attempts of initial + corrective call each for the lesson.
        let lesson_calls = orch
            .client
            .calls()
            .iter()
            .filter(|c| *c == "lesson")
            .count();
        assert_eq!(lesson_calls, 4);

        // The stored payload is the schema-valid placeholder.
        let (_, tasks) = orch.status(&job.id).unwrap();
        let lesson = tasks
            .iter()
            .find(|t| matches!(t.kind, TaskKind::Lesson { .. }))
            .unwrap();
        assert_eq!(lesson.status, TaskStatus::Completed);
        let payload = orch
            .store
            .read_content(lesson.result_ref.as_ref().unwrap())
            .unwrap();
        assert_eq!(
            payload,
            crate::validator::fallback_payload(&lesson.kind)
        );
    }

    #[tokio::test]
    async fn non_degradable_failure_fails_the_job_and_names_the_kind() {
        let tmp = TempDir::new().unwrap();
        let orch =
            Orchestrator::new(KindMock::invalid_for(&["module"]), test_config(&tmp)).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(1, 2))
            .unwrap();

        let finished = orch.run(&job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.as_ref().unwrap().contains("module"));

        // Lessons behind the failed module were never dispatched.
        assert!(orch.client.calls().iter().all(|c| c != "lesson"));

        // The task row records every attempt the executor made.
        let (_, tasks) = orch.status(&job.id).unwrap();
        let module = tasks
            .iter()
            .find(|t| matches!(t.kind, TaskKind::Module { .. }))
            .unwrap();
        assert_eq!(module.status, TaskStatus::Failed);
        assert_eq!(module.attempts, 2);

        // Failure raised an operator alert.
        let alerts = orch.log.alerts().unwrap();
        assert!(!alerts.is_empty());
    }

    #[tokio::test]
    async fn quota_refusal_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();

        // Exhaust the per-minute window with jobs that reach a terminal
        // state, freeing their concurrency slots.
        for _ in 0..3 {
            let job = orch
                .submit("user-1", Role::Free, course_config(1, 1))
                .unwrap();
            orch.run(&job.id).await.unwrap();
        }

        let err = orch
            .submit("user-1", Role::Free, course_config(1, 1))
            .unwrap_err();
        match err {
            EngineError::QuotaExceeded {
                limit,
                retry_after_secs,
            } => {
                assert_eq!(limit, crate::limiter::LimitKind::PerMinute);
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }

        // No job file, no task graph for the refused submission.
        let job_files = std::fs::read_dir(tmp.path().join("jobs")).unwrap().count();
        assert_eq!(job_files, 3);
    }

    #[tokio::test]
    async fn resume_finishes_a_job_without_regenerating_completed_tasks() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(2, 1))
            .unwrap();

        // Simulate a process that died mid-run: outline completed and
        // persisted, one module left dangling in Running.
        let mut tasks = graph::expand(&job);
        let outline_payload = KindMock::payload_for("outline");
        for task in tasks.iter_mut() {
            match task.kind {
                TaskKind::Outline => {
                    let result_ref = orch
                        .store
                        .write_content(&job.id, &task.id, &outline_payload)
                        .unwrap();
                    task.result_ref = Some(result_ref);
                    task.mark(TaskStatus::Completed);
                }
                TaskKind::Module { index: 0 } => task.mark(TaskStatus::Running),
                _ => {}
            }
        }
        let mut running = job.clone();
        running.mark_running();
        orch.store.save_job(&running, &tasks).unwrap();

        let finished = orch.resume().await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Completed);
        assert_eq!(finished[0].progress, 100);

        // The persisted outline was reused, not regenerated.
        assert!(orch.client.calls().iter().all(|c| c != "outline"));
    }

    #[tokio::test]
    async fn job_timeout_fails_job_and_remaining_tasks() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.job_timeout_secs = Some(0);
        let orch = Orchestrator::new(SleepyMock, config).unwrap();
        let job = orch
            .submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();

        let finished = orch.run(&job.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.as_ref().unwrap().contains("timed out"));

        let (_, tasks) = orch.status(&job.id).unwrap();
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Failed));
    }

    #[tokio::test]
    async fn submitting_over_concurrency_is_refused_until_release() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(KindMock::new(), test_config(&tmp)).unwrap();

        // Free role allows two concurrent jobs.
        let first = orch
            .submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();
        orch.submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();
        assert!(
            orch.submit("user-1", Role::Free, course_config(1, 1))
                .is_err()
        );

        // A terminal job frees its slot.
        orch.run(&first.id).await.unwrap();
        orch.submit("user-1", Role::Free, course_config(1, 1))
            .unwrap();
    }
}
