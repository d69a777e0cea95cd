// tests/coordinator_fake_backend.rs

mod common;
use crate::common::{Harness, wait_for_event};

use std::error::Error;
use std::time::Duration;

use gomander::errors::GomanderError;
use gomander::events::{Event, EventKind};
use gomander::types::{CommandStatus, ExitOutcome};
use gomander_test_utils::builders::{CommandBuilder, ProjectBuilder};
use gomander_test_utils::fake_backend::{FakeSignal, Script, ScriptedExit};

type TestResult = Result<(), Box<dyn Error>>;

fn finished(id: &str) -> impl FnMut(&Event) -> bool + '_ {
    move |e| matches!(e, Event::ProcessFinished { id: got, .. } if got == id)
}

fn abc_project() -> gomander::project::Project {
    ProjectBuilder::new("web")
        .command("a", "run a")
        .command("b", "run b")
        .command("c", "run c")
        .group("all", &["a", "b", "c"])
        .build()
}

#[tokio::test]
async fn second_start_is_rejected_while_running() -> TestResult {
    let h = Harness::with_project(abc_project()).await;

    h.app.run_command("a")?;
    match h.app.run_command("a") {
        Err(GomanderError::AlreadyRunning(id)) => assert_eq!(id, "a"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(h.backend.launch_count("a"), 1);
    assert_eq!(h.app.command_status("a")?, CommandStatus::Running);
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent_and_finish_fires_once() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    // Idle stop is a no-op.
    h.app.stop_command("a")?;

    h.app.run_command("a")?;
    h.app.stop_command("a")?;
    h.app.stop_command("a")?;

    let event = wait_for_event(&mut events, finished("a")).await;
    assert!(matches!(
        event,
        Event::ProcessFinished { outcome: ExitOutcome::Signalled, .. }
    ));
    assert_eq!(h.backend.signals("a"), vec![FakeSignal::Terminate]);
    assert_eq!(h.app.command_status("a")?, CommandStatus::Idle);

    h.app.stop_command("a")?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_none(), "no second ProcessFinished");
    Ok(())
}

#[tokio::test]
async fn stop_escalates_to_kill_after_grace() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend
        .script("a", Script::new().exit(ScriptedExit::IgnoreTerm));
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    h.app.run_command("a")?;
    h.app.stop_command("a")?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.app.command_status("a")?, CommandStatus::Running);

    wait_for_event(&mut events, finished("a")).await;
    assert_eq!(
        h.backend.signals("a"),
        vec![FakeSignal::Terminate, FakeSignal::Kill]
    );
    Ok(())
}

#[tokio::test]
async fn group_start_reports_partial_failure() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend.fail_spawn("b");

    let report = h.app.run_command_group("all").await?;
    assert_eq!(report.affected, vec!["a", "c"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "b");
    assert!(matches!(report.failures[0].1, GomanderError::Spawn { .. }));

    assert_eq!(h.app.command_status("a")?, CommandStatus::Running);
    assert_eq!(h.app.command_status("b")?, CommandStatus::Idle);
    assert_eq!(h.app.command_status("c")?, CommandStatus::Running);
    Ok(())
}

#[tokio::test]
async fn group_fan_out_skips_members_in_target_state() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    h.app.run_command("b")?;
    let report = h.app.run_command_group("all").await?;
    assert_eq!(report.affected, vec!["a", "c"]);
    assert_eq!(report.skipped, vec!["b"]);
    assert_eq!(h.backend.launch_count("b"), 1);

    h.app.stop_command("c")?;
    wait_for_event(&mut events, finished("c")).await;

    let report = h.app.stop_command_group("all").await?;
    assert_eq!(report.affected, vec!["a", "b"]);
    assert_eq!(report.skipped, vec!["c"]);
    assert!(report.is_success());
    Ok(())
}

#[tokio::test]
async fn deleting_running_commands_is_rejected() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut events = h.app.events().subscribe();

    h.app.run_command("a")?;
    assert!(matches!(h.app.remove_command("a"), Err(GomanderError::Busy(_))));
    assert!(matches!(
        h.app.delete_command_group("all"),
        Err(GomanderError::Busy(_))
    ));
    assert!(h.app.get_commands()?.contains_key("a"));

    h.app.stop_command("a")?;
    wait_for_event(&mut events, finished("a")).await;

    h.app.delete_command_group("all")?;
    let deleted = wait_for_event(&mut events, |e| {
        e.kind() == EventKind::CommandGroupDeleted
    })
    .await;
    assert_eq!(deleted.subject_id(), "all");

    h.app.remove_command("a")?;
    assert!(!h.app.get_commands()?.contains_key("a"));
    Ok(())
}

#[tokio::test]
async fn editing_launch_fields_of_running_command_is_busy() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.app.run_command("a")?;

    let mut renamed = h.app.get_commands()?["a"].clone();
    renamed.name = "alpha".to_string();
    renamed.error_patterns = vec!["panic".to_string()];
    assert_eq!(h.app.edit_command(renamed)?.name, "alpha");

    let mut changed = h.app.get_commands()?["a"].clone();
    changed.command = "run a --release".to_string();
    assert!(matches!(h.app.edit_command(changed), Err(GomanderError::Busy(_))));
    assert_eq!(h.app.get_commands()?["a"].command, "run a");
    Ok(())
}

#[tokio::test]
async fn matching_line_emits_one_failure_event() -> TestResult {
    let project = ProjectBuilder::new("p")
        .with_command(CommandBuilder::new("watched", "run").error_pattern("crashed"))
        .command("plain", "run")
        .build();
    let h = Harness::with_project(project).await;
    let script = Script::new()
        .stdout("booting")
        .stdout("app crashed unexpectedly")
        .exit(ScriptedExit::Code(1));
    h.backend.script("watched", script.clone());
    h.backend.script("plain", script);

    let mut events = h.app.events().subscribe();
    h.app.run_command("watched")?;
    h.app.run_command("plain")?;

    let mut failures = Vec::new();
    let mut done = 0;
    while done < 2 {
        match wait_for_event(&mut events, |_| true).await {
            Event::CommandFailed { id, line, patterns } => failures.push((id, line, patterns)),
            Event::ProcessFinished { .. } => done += 1,
            _ => {}
        }
    }
    assert_eq!(
        failures,
        vec![(
            "watched".to_string(),
            "app crashed unexpectedly".to_string(),
            vec!["crashed".to_string()]
        )]
    );
    Ok(())
}

#[tokio::test]
async fn every_line_is_delivered_before_the_finish_event() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut script = Script::new();
    for i in 1..=5 {
        script = script.stdout(&format!("out {i}"));
    }
    h.backend
        .script("a", script.stderr("warning").exit(ScriptedExit::Code(0)));

    let mut events = h
        .app
        .events()
        .subscribe_to(&[EventKind::NewLogEntry, EventKind::ProcessFinished]);
    let mut batches = h.app.subscribe_logs("a");
    h.app.run_command("a")?;

    let mut lines = Vec::new();
    loop {
        match wait_for_event(&mut events, |_| true).await {
            Event::NewLogEntry { id, line } if id == "a" => lines.push(line),
            Event::ProcessFinished { outcome, .. } => {
                assert_eq!(outcome, ExitOutcome::Exited(0));
                break;
            }
            _ => {}
        }
    }
    assert_eq!(
        lines,
        vec!["out 1", "out 2", "out 3", "out 4", "out 5", "warning"]
    );

    let mut batched = Vec::new();
    while let Ok(batch) = batches.try_recv() {
        batched.extend(batch.lines);
    }
    assert_eq!(batched, lines);
    assert_eq!(h.app.command_logs("a"), lines);
    Ok(())
}

#[tokio::test]
async fn restart_clears_previous_logs() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend
        .script("a", Script::new().stdout("first run").exit(ScriptedExit::Code(0)));
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    h.app.run_command("a")?;
    wait_for_event(&mut events, finished("a")).await;
    assert_eq!(h.app.command_logs("a"), vec!["first run"]);

    h.backend.script("a", Script::new());
    h.app.run_command("a")?;
    assert!(h.app.command_logs("a").is_empty());
    assert_eq!(h.backend.launch_count("a"), 2);
    Ok(())
}

#[tokio::test]
async fn output_read_error_aborts_the_instance() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend.script(
        "a",
        Script::new().stdout("before").exit(ScriptedExit::ReadError),
    );
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    h.app.run_command("a")?;
    let event = wait_for_event(&mut events, finished("a")).await;
    assert!(matches!(
        event,
        Event::ProcessFinished { outcome: ExitOutcome::Aborted, .. }
    ));
    assert!(h.backend.signals("a").contains(&FakeSignal::Kill));
    assert_eq!(h.app.command_status("a")?, CommandStatus::Idle);
    assert_eq!(h.app.command_logs("a"), vec!["before"]);
    Ok(())
}

#[tokio::test]
async fn natural_exit_returns_status_to_idle() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut events = h.app.events().subscribe();

    h.app.run_command("a")?;
    let started = wait_for_event(&mut events, |e| e.kind() == EventKind::ProcessStarted).await;
    assert_eq!(started.subject_id(), "a");

    assert!(h.backend.exit("a", 7));
    let event = wait_for_event(&mut events, finished("a")).await;
    assert!(matches!(
        event,
        Event::ProcessFinished { outcome: ExitOutcome::Exited(7), .. }
    ));
    assert_eq!(h.app.command_status("a")?, CommandStatus::Idle);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_creates_no_instance() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend.fail_spawn("a");
    let mut events = h.app.events().subscribe();

    match h.app.run_command("a") {
        Err(GomanderError::Spawn { command_id, .. }) => assert_eq!(command_id, "a"),
        other => panic!("expected Spawn error, got {other:?}"),
    }
    assert_eq!(h.app.command_status("a")?, CommandStatus::Idle);
    assert!(events.try_recv().is_none());
    Ok(())
}

#[tokio::test]
async fn missing_working_directory_is_rejected_before_spawn() -> TestResult {
    let project = ProjectBuilder::new("p")
        .with_command(CommandBuilder::new("a", "run").working_directory("no-such-dir-91f2"))
        .build();
    let h = Harness::with_project(project).await;

    assert!(matches!(h.app.run_command("a"), Err(GomanderError::Validation(_))));
    assert!(h.backend.launches().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_command_is_not_found() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    assert!(matches!(
        h.app.run_command("zzz"),
        Err(GomanderError::NotFound { .. })
    ));
    assert!(matches!(
        h.app.run_command_group("zzz").await,
        Err(GomanderError::NotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn config_paths_and_log_limit_apply_to_later_runs() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    let mut cfg = h.app.get_user_config();
    cfg.log_line_limit = 3;
    cfg.environment_paths
        .push(gomander::config::EnvironmentPath::new("/opt/gomander-tools/bin"));
    h.app.save_user_config(cfg)?;

    let mut script = Script::new();
    for i in 1..=10 {
        script = script.stdout(&i.to_string());
    }
    h.backend.script("a", script.exit(ScriptedExit::Code(0)));
    let mut events = h.app.events().subscribe_to(&[EventKind::ProcessFinished]);

    h.app.run_command("a")?;
    wait_for_event(&mut events, finished("a")).await;
    assert_eq!(h.app.command_logs("a"), vec!["8", "9", "10"]);

    let launch = &h.backend.launches()[0];
    let (_, path) = launch
        .env
        .iter()
        .find(|(k, _)| k == "PATH")
        .expect("PATH override");
    let last = std::env::split_paths(path).last();
    assert_eq!(last, Some(std::path::PathBuf::from("/opt/gomander-tools/bin")));
    Ok(())
}

#[tokio::test]
async fn clearing_logs_is_safe_while_running() -> TestResult {
    let h = Harness::with_project(abc_project()).await;
    h.backend.script("a", Script::new().stdout("hello"));
    h.app.run_command("a")?;

    let lines = common::with_timeout(async {
        loop {
            let lines = h.app.command_logs("a");
            if !lines.is_empty() {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(lines, vec!["hello"]);

    h.app.clear_command_logs("a");
    assert!(h.app.command_logs("a").is_empty());
    assert_eq!(h.app.command_status("a")?, CommandStatus::Running);
    Ok(())
}

#[tokio::test]
async fn wait_idle_resolves_after_stop_all() -> TestResult {
    use std::sync::Arc;

    use gomander::engine::ExecutionCoordinator;
    use gomander::events::EventBus;
    use gomander::fs::mock::MockFileSystem;
    use gomander::logs::LogMultiplexer;
    use gomander::project::ProjectStore;
    use gomander::registry::CommandRegistry;
    use gomander_test_utils::fake_backend::FakeBackend;
    use gomander_test_utils::with_timeout;
    use parking_lot::Mutex;

    let project = abc_project();
    let store = ProjectStore::new(Arc::new(MockFileSystem::new()), "/data");
    store.save(&project)?;
    let registry = Arc::new(Mutex::new(CommandRegistry::new(project, store)));
    let bus = EventBus::new();
    let coordinator = ExecutionCoordinator::new(
        registry,
        FakeBackend::new(),
        LogMultiplexer::new(100, bus.clone()),
        bus,
        common::fast_options(),
    );

    // Nothing running: resolves at once.
    with_timeout(coordinator.wait_idle()).await;

    coordinator.start_command("a")?;
    coordinator.start_command("b")?;
    assert_eq!(coordinator.running_ids().len(), 2);

    coordinator.stop_all();
    with_timeout(coordinator.wait_idle()).await;
    assert!(coordinator.running_ids().is_empty());
    assert_eq!(coordinator.status("a"), CommandStatus::Idle);
    Ok(())
}
