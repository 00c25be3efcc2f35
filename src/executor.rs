//! Task execution pipeline.
//!
//! One `execute` call takes a task all the way through: cache lookup,
//! breaker-guarded service call with a per-kind timeout, schema
//! validation, a single corrective re-invoke on violations, one full
//! retry after a fixed delay, and finally either a deterministic fallback
//! payload (degradable kinds) or a hard failure. Transient and validation
//! errors never escape this module; only exhausted retries and permanent
//! service errors do.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{sleep, timeout};

use crate::breaker::CircuitBreaker;
use crate::cache::{ContentCache, fingerprint};
use crate::error::EngineError;
use crate::genai::{GenAiError, GenerateRequest, TextGenerator};
use crate::job::{Job, RetryPolicy, Task, TaskKind};
use crate::validator::{self, FieldRule, Violation};

/// Outcome of executing one task.
#[derive(Debug)]
pub struct TaskRun {
    pub payload: Value,
    pub from_cache: bool,
    /// True when the payload is a placeholder substituted after retries
    /// were exhausted.
    pub degraded: bool,
    pub attempts: u32,
}

/// A task that exhausted its attempts without producing a payload. The
/// attempt count is carried so the caller can record it on the task row.
#[derive(Debug)]
pub struct TaskFailure {
    pub attempts: u32,
    pub error: EngineError,
}

pub struct TaskExecutor<'a, C: TextGenerator> {
    client: &'a C,
    cache: &'a ContentCache,
    breaker: &'a CircuitBreaker,
    policy: RetryPolicy,
}

impl<'a, C: TextGenerator> TaskExecutor<'a, C> {
    pub fn new(
        client: &'a C,
        cache: &'a ContentCache,
        breaker: &'a CircuitBreaker,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            breaker,
            policy,
        }
    }

    /// Execute one task. `deps` holds the payloads of every task in the
    /// dependency set, in dependency order.
    pub async fn execute(
        &self,
        job: &Job,
        task: &Task,
        deps: &[Value],
    ) -> Result<TaskRun, TaskFailure> {
        let inputs = prompt_inputs(job, &task.kind, deps);
        let key = fingerprint(task.kind.label(), &inputs);

        if let Some(payload) = self.cache.get(&key) {
            return Ok(TaskRun {
                payload,
                from_cache: true,
                degraded: false,
                attempts: 0,
            });
        }

        let attempts = AtomicU32::new(0);
        let ceiling = Duration::from_secs(self.policy.task_timeout_secs);
        let outcome = timeout(ceiling, self.run_attempts(task, &inputs, &attempts)).await;

        match outcome {
            Ok(Ok(payload)) => {
                self.cache.put(key, payload.clone());
                Ok(TaskRun {
                    payload,
                    from_cache: false,
                    degraded: false,
                    attempts: attempts.load(Ordering::Relaxed),
                })
            }
            Ok(Err(err)) => self.exhausted(task, err, attempts.load(Ordering::Relaxed)),
            Err(_elapsed) => self.exhausted(
                task,
                EngineError::TaskTimeout {
                    kind: task.kind.label().to_string(),
                    timeout_secs: self.policy.task_timeout_secs,
                },
                attempts.load(Ordering::Relaxed),
            ),
        }
    }

    /// All attempts failed (or the task ceiling fired). Degradable kinds
    /// substitute the placeholder; the rest propagate the last error.
    /// Fallbacks are never cached; a later identical request deserves a
    /// real generation attempt.
    fn exhausted(
        &self,
        task: &Task,
        err: EngineError,
        attempts: u32,
    ) -> Result<TaskRun, TaskFailure> {
        if task.kind.is_degradable() {
            Ok(TaskRun {
                payload: validator::fallback_payload(&task.kind),
                from_cache: false,
                degraded: true,
                attempts,
            })
        } else {
            let error = match err {
                timeout @ EngineError::TaskTimeout { .. } => timeout,
                other => EngineError::TaskFailed {
                    kind: task.kind.label().to_string(),
                    message: other.to_string(),
                },
            };
            Err(TaskFailure { attempts, error })
        }
    }

    async fn run_attempts(
        &self,
        task: &Task,
        inputs: &Value,
        attempts: &AtomicU32,
    ) -> Result<Value, EngineError> {
        let mut last_err = None;
        for attempt in 1..=self.policy.max_attempts {
            attempts.store(attempt, Ordering::Relaxed);
            match self.attempt(task, inputs).await {
                Ok(payload) => return Ok(payload),
                Err(err) => {
                    // Only validation failures and transient call failures
                    // earn the full retry; a permanent service error (bad
                    // key, malformed request) fails immediately.
                    let retryable =
                        matches!(err, EngineError::Validation(_)) || err.is_transient();
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt < self.policy.max_attempts {
                        sleep(Duration::from_millis(self.policy.retry_delay_ms)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::TaskFailed {
            kind: task.kind.label().to_string(),
            message: "no attempts were made".into(),
        }))
    }

    /// One attempt: an initial call plus at most one corrective re-invoke
    /// when the first response fails validation.
    async fn attempt(&self, task: &Task, inputs: &Value) -> Result<Value, EngineError> {
        let shape = validator::shape_for(&task.kind);
        let prompt = build_prompt(&task.kind, inputs);

        let payload = self.call_and_parse(task, &prompt).await?;
        match validator::validate(&payload, shape) {
            Ok(()) => Ok(payload),
            Err(violations) => {
                let corrective = corrective_prompt(&prompt, &violations);
                let retried = self.call_and_parse(task, &corrective).await?;
                validator::validate(&retried, shape)
                    .map(|()| retried)
                    .map_err(|vs| EngineError::Validation(render_violations(&vs)))
            }
        }
    }

    /// One breaker-guarded, timed service call whose text must parse as
    /// JSON. The breaker sees exactly one success or failure per call.
    async fn call_and_parse(&self, task: &Task, prompt: &str) -> Result<Value, EngineError> {
        self.breaker.try_acquire()?;

        let req = GenerateRequest {
            task: task.kind.label().to_string(),
            prompt: prompt.to_string(),
            max_tokens: task.kind.max_tokens(),
        };

        let call_timeout = task.kind.call_timeout();
        let response = match timeout(call_timeout, self.client.generate(&req)).await {
            Ok(Ok(response)) => {
                self.breaker.record_success();
                response
            }
            Ok(Err(err)) => {
                self.breaker.record_failure();
                return Err(err.into());
            }
            Err(_elapsed) => {
                self.breaker.record_failure();
                return Err(GenAiError::Timeout {
                    timeout_secs: call_timeout.as_secs(),
                }
                .into());
            }
        };

        serde_json::from_str(&response.text)
            .map_err(|e| EngineError::Validation(format!("response is not valid JSON: {e}")))
    }
}

/// The semantically significant inputs of a task, used both for the cache
/// fingerprint and the prompt. Dependency payloads are part of the inputs:
/// a lesson generated from a different module is different work.
pub fn prompt_inputs(job: &Job, kind: &TaskKind, deps: &[Value]) -> Value {
    json!({
        "course": {
            "title": job.config.title,
            "audience": job.config.audience,
            "depth": job.config.depth,
            "duration_weeks": job.config.duration_weeks,
        },
        "task": serde_json::to_value(kind).unwrap_or(Value::Null),
        "context": deps,
    })
}

fn build_prompt(kind: &TaskKind, inputs: &Value) -> String {
    let shape = validator::shape_for(kind);
    let mut requirements = String::new();
    for field in shape.fields {
        requirements.push_str("- ");
        requirements.push_str(field.path);
        requirements.push_str(": ");
        requirements.push_str(&describe_rules(field.rules));
        requirements.push('\n');
    }

    format!(
        "You are generating educational course content.\n\
         Produce one {} for the course described in the inputs below.\n\
         Respond with ONLY a valid JSON object, no other text.\n\
         \n\
         Required fields:\n{requirements}\n\
         Inputs:\n{}",
        shape.name,
        serde_json::to_string_pretty(inputs).unwrap_or_default(),
    )
}

fn describe_rules(rules: &[FieldRule]) -> String {
    let parts: Vec<String> = rules
        .iter()
        .filter_map(|rule| match rule {
            FieldRule::Required => None,
            FieldRule::MinLength(min) => Some(format!("string, at least {min} characters")),
            FieldRule::MinItems(min) => Some(format!("list, at least {min} items")),
            FieldRule::OneOf(allowed) => Some(format!("one of {}", allowed.join(", "))),
        })
        .collect();
    if parts.is_empty() {
        "required".to_string()
    } else {
        parts.join("; ")
    }
}

fn corrective_prompt(base: &str, violations: &[Violation]) -> String {
    let mut feedback = String::from(
        "\n\nYour previous response failed validation with these problems:\n",
    );
    for violation in violations {
        feedback.push_str("- ");
        feedback.push_str(&violation.to_string());
        feedback.push('\n');
    }
    feedback.push_str("Return the corrected JSON object only.");
    format!("{base}{feedback}")
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
