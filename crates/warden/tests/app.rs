// End-to-end behaviour: the scheduler engine firing real agents against a
// real database file, one-shot exclusion, and state surviving a restart.

use std::time::Duration;

use serde_json::json;
use warden::{AgentDef, App, RunContext, RunStatus, ScheduleRule, SchedulerError, WardenConfig, WorkResult};

fn test_config(dir: &tempfile::TempDir) -> WardenConfig {
    WardenConfig {
        db: dir
            .path()
            .join("warden.db")
            .to_string_lossy()
            .into_owned(),
        log_level: "warn".to_string(),
        tick_ms: 50,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_agent_accumulates_success_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::with_config(test_config(&dir));
    app.register(
        AgentDef::new("ping", |_ctx: &mut RunContext<'_>| -> WorkResult { Ok(Some(json!("ok"))) })
            .schedule(ScheduleRule::Interval {
                every: Duration::from_millis(250),
            }),
    )
    .unwrap();
    let store = app.store().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(app.serve(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(1050)).await;
    shutdown_tx.send(true).unwrap();
    engine.await.unwrap().unwrap();

    let runs = store.recent_runs("ping", 50).unwrap();
    assert!(
        (2..=8).contains(&runs.len()),
        "expected a handful of runs, got {}",
        runs.len()
    );
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert!(runs.iter().all(|r| r.result == Some(json!("ok"))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_agent_never_overlaps_itself() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::with_config(test_config(&dir));
    app.register(
        AgentDef::new("slow", |_ctx: &mut RunContext<'_>| -> WorkResult {
            std::thread::sleep(Duration::from_millis(400));
            Ok(None)
        })
        .schedule(ScheduleRule::Interval {
            every: Duration::from_millis(150),
        }),
    )
    .unwrap();
    let store = app.store().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(app.serve(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    shutdown_tx.send(true).unwrap();
    engine.await.unwrap().unwrap();

    let mut runs = store.recent_runs("slow", 50).unwrap();
    runs.sort_by_key(|r| r.started_at);
    assert!(runs.len() >= 2, "expected at least two runs");
    // ticks due while a run was in flight were skipped, not queued
    assert!(runs.len() <= 4, "skipped ticks must not pile up: {}", runs.len());
    for pair in runs.windows(2) {
        assert!(
            pair[0].finished_at <= pair[1].started_at,
            "runs overlap: {} .. {} vs {} .. {}",
            pair[0].started_at,
            pair[0].finished_at,
            pair[1].started_at,
            pair[1].finished_at
        );
    }
}

#[test]
fn run_now_executes_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::with_config(test_config(&dir));
    app.register(AgentDef::new("hello", |ctx: &mut RunContext<'_>| -> WorkResult {
        ctx.log("hi");
        Ok(Some(json!("done")))
    }))
    .unwrap();

    let record = app.run_now("hello").unwrap();
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.result, Some(json!("done")));
    assert_eq!(record.output.as_deref(), Some("hi\n"));
}

#[test]
fn run_now_unknown_agent() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::with_config(test_config(&dir));
    let err = app.run_now("ghost").unwrap_err();
    assert!(matches!(err, SchedulerError::AgentNotFound { .. }));
}

#[test]
fn run_now_observes_per_agent_exclusion() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::with_config(test_config(&dir));
    app.register(AgentDef::new("slow", |_ctx: &mut RunContext<'_>| -> WorkResult {
        std::thread::sleep(Duration::from_millis(500));
        Ok(None)
    }))
    .unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            app.run_now("slow").unwrap();
        });
        std::thread::sleep(Duration::from_millis(100));
        let err = app.run_now("slow").unwrap_err();
        assert!(matches!(err, SchedulerError::AgentBusy { .. }));
    });

    // the slot frees up once the first run finishes
    app.run_now("slow").unwrap();
    let runs = app.store().unwrap().recent_runs("slow", 10).unwrap();
    assert_eq!(runs.len(), 2);
}

#[test]
fn state_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut app = App::with_config(test_config(&dir));
        app.register(AgentDef::new("keeper", |ctx: &mut RunContext<'_>| -> WorkResult {
            ctx.state().set("x", json!(1))?;
            ctx.state()
                .set("doc", json!({"nested": {"deep": [1, 2, 3]}}))?;
            Ok(None)
        }))
        .unwrap();
        let record = app.run_now("keeper").unwrap();
        assert_eq!(record.status, RunStatus::Success);
    }

    // a brand-new app over the same file sees the committed state
    let app = App::with_config(test_config(&dir));
    let store = app.store().unwrap();
    assert_eq!(store.state_get("keeper", "x").unwrap(), Some(json!(1)));
    assert_eq!(
        store.state_get("keeper", "doc").unwrap(),
        Some(json!({"nested": {"deep": [1, 2, 3]}}))
    );
}

#[test]
fn duplicate_registration_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = App::with_config(test_config(&dir));
    app.register(AgentDef::new("dup", |_ctx: &mut RunContext<'_>| -> WorkResult { Ok(None) }))
        .unwrap();
    let err = app
        .register(AgentDef::new("dup", |_ctx: &mut RunContext<'_>| -> WorkResult { Ok(None) }))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateAgent { .. }));
}
