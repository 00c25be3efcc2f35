//! Task graph expansion.
//!
//! A job expands once into a fixed dependency graph:
//!
//! ```text
//! outline ── module[0] ── lesson[0.0] … lesson[0.n]  assessment[0]
//!        └── module[1] ── lesson[1.0] … lesson[1.n]  assessment[1]
//!        …
//! ```
//!
//! Each [`TaskKind`] variant carries its dependency template here and
//! nowhere else; scheduling never dispatches on strings.

use std::collections::HashMap;

use super::job::Job;
use super::task::{Task, TaskKind, TaskStatus};

/// Materialize the full task set for a job. Called exactly once per job;
/// re-expansion is prevented by the orchestrator reloading persisted tasks.
pub fn expand(job: &Job) -> Vec<Task> {
    let mut tasks = Vec::new();

    let outline = Task::new(&job.id, TaskKind::Outline, Vec::new());
    let outline_id = outline.id.clone();
    tasks.push(outline);

    for m in 0..job.config.module_count {
        let module = Task::new(&job.id, TaskKind::Module { index: m }, vec![outline_id.clone()]);
        let module_id = module.id.clone();
        tasks.push(module);

        for l in 0..job.config.lessons_per_module {
            tasks.push(Task::new(
                &job.id,
                TaskKind::Lesson {
                    module_index: m,
                    index: l,
                },
                vec![module_id.clone()],
            ));
        }

        if job.config.include_assessments {
            tasks.push(Task::new(
                &job.id,
                TaskKind::Assessment { module_index: m },
                vec![module_id.clone()],
            ));
        }
    }

    tasks
}

/// Ids of pending tasks whose dependency sets are fully completed,
/// derived purely from task statuses so a resumed process computes the
/// same set a crashed one would have.
pub fn ready_ids(tasks: &HashMap<String, Task>) -> Vec<String> {
    let mut ids: Vec<String> = tasks
        .values()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| {
            t.depends_on.iter().all(|dep| {
                tasks
                    .get(dep)
                    .is_some_and(|d| d.status == TaskStatus::Completed)
            })
        })
        .map(|t| t.id.clone())
        .collect();
    // Deterministic dispatch order for equal readiness.
    ids.sort_by_key(|id| tasks[id].created_at);
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job::{JobConfig, Role};

    fn job_with(modules: usize, lessons: usize, assessments: bool) -> Job {
        Job::new(
            "user-1".into(),
            Role::Free,
            JobConfig {
                title: "Graph test".into(),
                module_count: modules,
                lessons_per_module: lessons,
                include_assessments: assessments,
                ..Default::default()
            },
        )
    }

    fn index(tasks: Vec<Task>) -> HashMap<String, Task> {
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    #[test]
    fn expand_creates_expected_task_count() {
        // 1 outline + 2 modules + 4 lessons.
        let job = job_with(2, 2, false);
        let tasks = expand(&job);
        assert_eq!(tasks.len(), 7);

        let outlines = tasks
            .iter()
            .filter(|t| t.kind == TaskKind::Outline)
            .count();
        assert_eq!(outlines, 1);
    }

    #[test]
    fn expand_with_assessments_adds_one_per_module() {
        let job = job_with(3, 2, true);
        let tasks = expand(&job);
        // 1 + 3 + 6 + 3
        assert_eq!(tasks.len(), 13);
    }

    #[test]
    fn modules_depend_on_outline_and_lessons_on_their_module() {
        let job = job_with(2, 2, false);
        let tasks = expand(&job);
        let outline_id = tasks
            .iter()
            .find(|t| t.kind == TaskKind::Outline)
            .unwrap()
            .id
            .clone();

        for task in &tasks {
            match &task.kind {
                TaskKind::Outline => assert!(task.depends_on.is_empty()),
                TaskKind::Module { .. } => {
                    assert_eq!(task.depends_on, vec![outline_id.clone()]);
                }
                TaskKind::Lesson { module_index, .. } => {
                    let dep = &task.depends_on[0];
                    let parent = tasks.iter().find(|t| &t.id == dep).unwrap();
                    assert_eq!(
                        parent.kind,
                        TaskKind::Module {
                            index: *module_index
                        }
                    );
                }
                TaskKind::Assessment { .. } => unreachable!("assessments disabled"),
            }
        }
    }

    #[test]
    fn only_outline_is_ready_initially() {
        let job = job_with(2, 2, false);
        let tasks = index(expand(&job));
        let ready = ready_ids(&tasks);
        assert_eq!(ready.len(), 1);
        assert_eq!(tasks[&ready[0]].kind, TaskKind::Outline);
    }

    #[test]
    fn completing_outline_readies_all_modules() {
        let job = job_with(2, 2, false);
        let mut tasks = index(expand(&job));
        let outline_id = tasks
            .values()
            .find(|t| t.kind == TaskKind::Outline)
            .unwrap()
            .id
            .clone();
        tasks.get_mut(&outline_id).unwrap().status = TaskStatus::Completed;

        let ready = ready_ids(&tasks);
        assert_eq!(ready.len(), 2);
        for id in ready {
            assert!(matches!(tasks[&id].kind, TaskKind::Module { .. }));
        }
    }

    #[test]
    fn lessons_not_ready_until_their_module_completes() {
        let job = job_with(2, 2, false);
        let mut tasks = index(expand(&job));
        for task in tasks.values_mut() {
            if matches!(task.kind, TaskKind::Outline | TaskKind::Module { index: 0 }) {
                task.status = TaskStatus::Completed;
            }
        }

        let ready = ready_ids(&tasks);
        // Module 1 plus the two lessons of module 0.
        assert_eq!(ready.len(), 3);
        let lesson_count = ready
            .iter()
            .filter(|id| matches!(tasks[*id].kind, TaskKind::Lesson { module_index: 0, .. }))
            .count();
        assert_eq!(lesson_count, 2);
    }
}
