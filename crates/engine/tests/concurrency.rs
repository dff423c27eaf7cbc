//! Per-instance serialization and activation races.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{data, definition, directory, GatedDirectory, Harness, RecordingNotifier};
use taskflow_engine::config::EngineConfig;
use taskflow_engine::engine::{InstanceData, InstanceStatus};
use taskflow_engine::store::InMemoryStore;
use taskflow_engine::{EngineError, WorkflowEngine};

const WIDE: &str = r#"
name: wide
version: 1.0.0
start: kickoff
steps:
  - id: kickoff
    kind: task
    transitions:
      - to: a
      - to: b
      - to: c
      - to: d
      - to: e
  - { id: a, kind: task, transitions: [ { to: done } ] }
  - { id: b, kind: task, transitions: [ { to: done } ] }
  - { id: c, kind: task, transitions: [ { to: done } ] }
  - { id: d, kind: task, transitions: [ { to: done } ] }
  - { id: e, kind: task, transitions: [ { to: done } ] }
  - { id: done, kind: end }
"#;

const REVIEWED: &str = r#"
name: reviewed
version: 1.0.0
start: prepare
steps:
  - id: prepare
    kind: task
    transitions:
      - to: review
      - to: notes
  - id: review
    kind: approval
    assign: { role: reviewer }
    transitions: [ { to: done } ]
  - id: notes
    kind: task
    transitions: [ { to: done } ]
  - { id: done, kind: end }
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_completions_on_one_instance_lose_nothing() {
    let h = Harness::new();
    let def_id = h.deploy(WIDE).await;

    let instance_id = h
        .engine
        .start_instance(def_id, data(json!({})), "alice")
        .await
        .unwrap();
    let kickoff = h.pending_step(instance_id, "kickoff").await;
    h.engine
        .complete_task(kickoff.id, data(json!({})), "alice")
        .await
        .unwrap();

    let branches = h.pending(instance_id).await;
    assert_eq!(branches.len(), 5);

    let mut handles = Vec::new();
    for task in branches {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            let mut completion = InstanceData::new();
            completion.insert(format!("done_{}", task.step_id), json!(true));
            engine.complete_task(task.id, completion, "alice").await
        }));
    }

    let mut completed_instance = 0;
    for handle in handles {
        let completion = handle.await.unwrap().unwrap();
        if completion.instance_status == InstanceStatus::Completed {
            completed_instance += 1;
        }
    }
    // only the last completion closes the instance
    assert_eq!(completed_instance, 1);

    let status = h.engine.get_instance_status(instance_id).await.unwrap();
    assert_eq!(status.instance.status, InstanceStatus::Completed);
    for step in ["a", "b", "c", "d", "e"] {
        assert_eq!(status.instance.data[&format!("done_{}", step)], json!(true));
    }
    assert_eq!(status.completed_tasks.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_completions_of_one_task_succeed_once() {
    let h = Harness::new();
    let def_id = h.deploy(WIDE).await;
    let instance_id = h
        .engine
        .start_instance(def_id, data(json!({})), "alice")
        .await
        .unwrap();
    let kickoff = h.pending_step(instance_id, "kickoff").await.id;

    let attempts: Vec<_> = (0..4)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .complete_task(kickoff, data(json!({})), "alice")
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(h.pending(instance_id).await.len(), 5);
    assert_eq!(h.store.task_count().await, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_instance_does_not_stall_others() {
    let gated = Arc::new(GatedDirectory::new(
        directory().with_role("reviewer", ["slowpoke"]),
        "slowpoke",
    ));
    let h = Harness::with_directory(gated.clone());
    let def_id = h.deploy(REVIEWED).await;

    let blocked = h
        .engine
        .start_instance(def_id, data(json!({})), "alice")
        .await
        .unwrap();
    let free = h
        .engine
        .start_instance(def_id, data(json!({})), "bob")
        .await
        .unwrap();

    let prepare = h.pending_step(blocked, "prepare").await;
    h.engine.complete_task(prepare.id, data(json!({})), "alice").await.unwrap();
    let review = h.pending_step(blocked, "review").await;
    let notes = h.pending_step(blocked, "notes").await;
    assert_eq!(review.assignee.as_deref(), Some("rita"));

    // slowpoke is not the assignee, so the role check runs and waits on the gate
    let engine = h.engine.clone();
    let waiting = tokio::spawn(async move {
        engine.complete_task(review.id, data(json!({"verdict": "ok"})), "slowpoke").await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // another instance proceeds
    let free_prepare = h.pending_step(free, "prepare").await;
    let other = tokio::time::timeout(
        Duration::from_secs(1),
        h.engine.complete_task(free_prepare.id, data(json!({})), "bob"),
    )
    .await;
    assert!(matches!(other, Ok(Ok(_))));

    // the same instance waits for the exclusive section
    let same = tokio::time::timeout(
        Duration::from_millis(100),
        h.engine.complete_task(notes.id, data(json!({})), "alice"),
    )
    .await;
    assert!(same.is_err());

    gated.gate.add_permits(1);
    let completion = waiting.await.unwrap().unwrap();
    assert_eq!(completion.instance_status, InstanceStatus::Running);

    let last = h
        .engine
        .complete_task(notes.id, data(json!({})), "alice")
        .await
        .unwrap();
    assert_eq!(last.instance_status, InstanceStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_activations_succeed_once() {
    let engine = WorkflowEngine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(directory()),
        Arc::new(RecordingNotifier::default()),
        &EngineConfig::default(),
    );
    let id = engine.define_workflow(definition(WIDE)).await.unwrap();

    let racers: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.activate_workflow(id).await })
        })
        .collect();

    let mut won = 0;
    for racer in racers {
        match racer.await.unwrap() {
            Ok(()) => won += 1,
            Err(EngineError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(won, 1);
    assert!(engine.get_definition(id).await.unwrap().is_active());

    // the active definition is usable and a second deploy of the same version is refused
    assert!(engine.start_instance(id, data(json!({})), "alice").await.is_ok());
    let err = engine.define_workflow(definition(WIDE)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}
