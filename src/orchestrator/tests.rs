//! Run driver tests over scripted assistant and repo doubles

use super::*;
use crate::context::SUMMARY_EXTRACTION_PROMPT;
use crate::models::Task;
use crate::testing::{
    exit_output, ok_output, ready_run, summary_response, writer_task, ScriptedAssistant,
    ScriptedRepo,
};
use std::sync::Mutex;
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    store: Arc<Store>,
    run_id: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

/// A driver whose assistant records every work prompt and always succeeds.
fn driver(tasks: Vec<Task>) -> (Fixture, RunDriver) {
    driver_with(tasks, None)
}

/// `fail_task`: id whose work prompt should come back with exit code 1.
fn driver_with(tasks: Vec<Task>, fail_task: Option<&str>) -> (Fixture, RunDriver) {
    let temp = TempDir::new().unwrap();
    let workdir = temp.path().join("worktree");
    std::fs::create_dir_all(&workdir).unwrap();
    let store = Arc::new(Store::new(temp.path().join("state")).unwrap());

    let mut run = ready_run("run00001", &workdir, tasks);
    store.save_run(&mut run).unwrap();

    let prompts = Arc::new(Mutex::new(Vec::new()));
    let fail_marker = fail_task.map(|id| format!("**task {id}**"));
    let assistant = {
        let prompts = prompts.clone();
        Arc::new(ScriptedAssistant::new(move |prompt: &str| {
            if prompt == SUMMARY_EXTRACTION_PROMPT {
                return Ok(ok_output(&summary_response(&["src/out.rs"])));
            }
            prompts.lock().unwrap().push(prompt.to_string());
            if let Some(marker) = &fail_marker {
                if prompt.contains(marker.as_str()) {
                    return Ok(exit_output(1, "", "injected failure"));
                }
            }
            Ok(ok_output("work done"))
        }))
    };

    let cfg = Config {
        max_parallel: 3,
        lock_timeout_secs: 2,
        ..Config::default()
    };
    let driver = RunDriver::new(cfg, store.clone(), assistant, Arc::new(ScriptedRepo::always_dirty()));

    (
        Fixture {
            _temp: temp,
            store,
            run_id: run.id,
            prompts,
        },
        driver,
    )
}

/// t1 and t2 prepare independent files; t3 depends on both.
fn diamond_tasks() -> Vec<Task> {
    let mut t3 = writer_task("t3", &["c.x"]);
    t3.reads = vec!["a.x".into(), "b.x".into()];
    t3.depends_on = vec!["t1".into(), "t2".into()];
    vec![writer_task("t1", &["a.x"]), writer_task("t2", &["b.x"]), t3]
}

#[test]
fn test_run_completes_and_batches_respect_dependencies() {
    let (fx, driver) = driver(diamond_tasks());

    driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap();

    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.is_complete());
    for task in &run.tasks {
        assert!(task.commit.is_some());
        assert!(task.summary.is_some());
    }

    // t3's prompt was built last, after both dependencies.
    let prompts = fx.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("**task t3**"));
}

#[test]
fn test_dependent_prompt_carries_dependency_summaries() {
    let (fx, driver) = driver(diamond_tasks());

    driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap();

    let prompts = fx.prompts.lock().unwrap();
    let t3_prompt = prompts
        .iter()
        .find(|p| p.contains("**task t3**"))
        .expect("t3 prompt recorded");
    // Both dependency summaries are injected in full form.
    assert!(t3_prompt.contains("## Summary from Task: task t1"));
    assert!(t3_prompt.contains("## Summary from Task: task t2"));
}

#[test]
fn test_progress_callback_sees_completion_grow() {
    let (fx, driver) = driver(diamond_tasks());

    let seen = Mutex::new(Vec::new());
    let progress = |completed: usize, total: usize| {
        seen.lock().unwrap().push((completed, total));
    };
    driver
        .execute(&fx.run_id, &CancelToken::new(), Some(&progress))
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.first(), Some(&(0, 3)));
    assert_eq!(seen.last(), Some(&(3, 3)));
    // Monotonic.
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn test_first_failure_marks_run_failed_and_stops() {
    let mut t2 = writer_task("t2", &["b.x"]);
    t2.depends_on = vec!["t1".into()];
    let mut t3 = writer_task("t3", &["c.x"]);
    t3.depends_on = vec!["t2".into()];
    let tasks = vec![writer_task("t1", &["a.x"]), t2, t3];

    let (fx, driver) = driver_with(tasks, Some("t2"));
    let err = driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Assistant { .. })
    ));

    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_ref().unwrap().contains("assistant failed"));
    // The completed predecessor keeps its commit.
    assert_eq!(run.get_task("t1").unwrap().status, TaskStatus::Completed);
    assert!(run.get_task("t1").unwrap().commit.is_some());
    // The dependent never started.
    assert_eq!(run.get_task("t3").unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_unreachable_tasks_fail_the_run() {
    // t2 depends on a task that already failed and is not being retried.
    let mut t1 = writer_task("t1", &["a.x"]);
    t1.status = TaskStatus::Failed;
    let mut t2 = writer_task("t2", &["b.x"]);
    t2.depends_on = vec!["t1".into()];

    let (fx, driver) = driver(vec![t1, t2]);
    let err = driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap_err();

    assert!(err.to_string().contains("unreachable"));
    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_ref().unwrap().contains("t2"));
}

#[test]
fn test_resume_after_interruption() {
    // Five tasks: 1-2 completed with summaries and commits, 3 interrupted
    // mid-flight, 4 depends on 3, 5 independent.
    let mut t1 = writer_task("t1", &["a.x"]);
    t1.status = TaskStatus::Completed;
    t1.commit = Some("c1".into());
    t1.summary = Some(crate::models::TaskSummary {
        task_id: "t1".into(),
        decisions: vec!["used the flat layout".into()],
        ..Default::default()
    });
    let mut t2 = writer_task("t2", &["b.x"]);
    t2.status = TaskStatus::Completed;
    t2.commit = Some("c2".into());
    t2.summary = Some(crate::models::TaskSummary {
        task_id: "t2".into(),
        ..Default::default()
    });
    let mut t3 = writer_task("t3", &["c.x"]);
    t3.status = TaskStatus::Running;
    t3.started_at = Some(chrono::Utc::now());
    let mut t4 = writer_task("t4", &["d.x"]);
    t4.depends_on = vec!["t3".into(), "t1".into()];
    let t5 = writer_task("t5", &["e.x"]);

    let (fx, driver) = driver(vec![t1, t2, t3, t4, t5]);
    driver
        .resume(&fx.run_id, &CancelToken::new(), None)
        .unwrap();

    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.is_complete());
    // The interrupted task was re-run, not trusted.
    assert!(run.get_task("t3").unwrap().commit.is_some());
    // Prior completions were preserved untouched.
    assert_eq!(run.get_task("t1").unwrap().commit.as_deref(), Some("c1"));

    // t4's prompt saw t1's preserved summary.
    let prompts = fx.prompts.lock().unwrap();
    let t4_prompt = prompts
        .iter()
        .find(|p| p.contains("**task t4**"))
        .expect("t4 prompt recorded");
    assert!(t4_prompt.contains("used the flat layout"));
}

#[test]
fn test_resume_of_failed_run_retries_failed_tasks() {
    let mut t1 = writer_task("t1", &["a.x"]);
    t1.status = TaskStatus::Failed;
    t1.error = Some("assistant failed: boom".into());

    let (fx, driver) = driver(vec![t1]);
    fx.store
        .set_run_status(&fx.run_id, RunStatus::Failed, Some("boom".into()))
        .unwrap();

    driver
        .resume(&fx.run_id, &CancelToken::new(), None)
        .unwrap();

    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.get_task("t1").unwrap().status, TaskStatus::Completed);
}

#[test]
fn test_resume_of_completed_run_is_rejected() {
    let mut t1 = writer_task("t1", &["a.x"]);
    t1.status = TaskStatus::Completed;

    let (fx, driver) = driver(vec![t1]);
    fx.store
        .set_run_status(&fx.run_id, RunStatus::Completed, None)
        .unwrap();

    let err = driver
        .resume(&fx.run_id, &CancelToken::new(), None)
        .unwrap_err();
    assert!(err.to_string().contains("already completed"));
}

#[test]
fn test_pre_cancelled_token_cancels_before_scheduling() {
    let (fx, driver) = driver(diamond_tasks());

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = driver.execute(&fx.run_id, &cancel, None).unwrap_err();

    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::Cancelled)
    );
    let run = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    // No task was started.
    assert!(fx.prompts.lock().unwrap().is_empty());
}

#[test]
fn test_externally_persisted_cancel_stops_between_batches() {
    // A second process (the `cancel` command) flips the run status while a
    // batch is in flight; the reload between batches must observe it.
    let temp = TempDir::new().unwrap();
    let workdir = temp.path().join("worktree");
    std::fs::create_dir_all(&workdir).unwrap();
    let store = Arc::new(Store::new(temp.path().join("state")).unwrap());

    let mut run = ready_run("run00001", &workdir, diamond_tasks());
    store.save_run(&mut run).unwrap();
    let run_id = run.id.clone();

    let assistant = {
        let store = store.clone();
        let run_id = run_id.clone();
        Arc::new(ScriptedAssistant::new(move |prompt: &str| {
            if prompt == SUMMARY_EXTRACTION_PROMPT {
                return Ok(ok_output(&summary_response(&["src/out.rs"])));
            }
            // Simulate `aiflow cancel` landing while the first batch runs.
            store
                .set_run_status(&run_id, RunStatus::Cancelled, None)
                .unwrap();
            Ok(ok_output("work done"))
        }))
    };

    let driver = RunDriver::new(
        Config::default(),
        store.clone(),
        assistant,
        Arc::new(ScriptedRepo::always_dirty()),
    );

    let err = driver
        .execute(&run_id, &CancelToken::new(), None)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::Cancelled)
    );

    let run = store.load_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    // The dependent task never ran.
    assert_eq!(run.get_task("t3").unwrap().status, TaskStatus::Pending);
}

#[test]
fn test_execute_on_empty_run_is_rejected() {
    let (fx, driver) = driver(Vec::new());
    let err = driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap_err();
    assert!(err.to_string().contains("no tasks"));
}

#[test]
fn test_rerunning_a_completed_run_is_a_noop_completion() {
    let (fx, driver) = driver(diamond_tasks());
    driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap();
    let after_first = fx.store.load_run(&fx.run_id).unwrap();
    let commits: Vec<_> = after_first.tasks.iter().map(|t| t.commit.clone()).collect();

    driver
        .execute(&fx.run_id, &CancelToken::new(), None)
        .unwrap();

    let after_second = fx.store.load_run(&fx.run_id).unwrap();
    assert_eq!(after_second.status, RunStatus::Completed);
    let commits_again: Vec<_> = after_second.tasks.iter().map(|t| t.commit.clone()).collect();
    // Completed tasks were not re-executed.
    assert_eq!(commits, commits_again);
    assert_eq!(fx.prompts.lock().unwrap().len(), 3);
}
