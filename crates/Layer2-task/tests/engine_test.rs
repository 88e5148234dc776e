//! End-to-end engine tests against a scripted stand-in for the container tool

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

use boxforge_task::{
    CancelReason, EngineConfig, ExitInfo, LogSource, Operation, TaskEngine, TaskEvent, TaskId,
    TaskStatus,
};
use tempfile::TempDir;
use tokio::time::sleep;

/// Write an executable shell script that plays the external tool
fn fake_tool(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("fakebox");
    let script = format!("#!/bin/sh\n{}\n", body);
    fs::write(&path, script).expect("write fake tool script");
    let mut perms = fs::metadata(&path).expect("stat fake tool").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fake tool");
    path.to_string_lossy().into_owned()
}

fn engine_with(tool: &str) -> TaskEngine {
    TaskEngine::new(EngineConfig::default().with_tool(tool))
}

fn stop_op(name: &str) -> Operation {
    Operation::Stop {
        name: name.to_string(),
    }
}

async fn wait_until_running(engine: &TaskEngine, id: TaskId) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let task = engine.get(id).await.expect("task exists");
        if task.status == TaskStatus::Running {
            return;
        }
        assert_eq!(
            task.status,
            TaskStatus::Pending,
            "task ended before it started running"
        );
        assert!(Instant::now() < deadline, "task never started running");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn stop_runs_the_exact_argv_and_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args.txt");
    let tool = fake_tool(
        &dir,
        &format!("printf '%s' \"$*\" > {}", args_file.display()),
    );
    let engine = engine_with(&tool);

    let id = engine.submit(stop_op("devbox")).await.unwrap();
    let task = engine.wait(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.exit, Some(ExitInfo::Exited(0)));
    assert!(task.started_at.is_some());
    assert!(task.ended_at.is_some());

    let recorded = fs::read_to_string(&args_file).unwrap();
    assert_eq!(recorded, "stop devbox");

    // First log line announces the command
    assert_eq!(task.log[0].seq, 1);
    assert_eq!(task.log[0].source, LogSource::System);
    assert!(task.log[0].text.contains("stop devbox"));
}

#[tokio::test]
async fn failing_operation_keeps_exit_code_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "echo \"Error: no such container ghost\" >&2\nexit 2",
    );
    let engine = engine_with(&tool);

    let id = engine
        .submit(Operation::Delete {
            name: "ghost".to_string(),
        })
        .await
        .unwrap();
    let task = engine.wait(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit, Some(ExitInfo::Exited(2)));

    let stderr_lines: Vec<&str> = task
        .log
        .iter()
        .filter(|line| line.source == LogSource::Stderr)
        .map(|line| line.text.as_str())
        .collect();
    assert_eq!(stderr_lines, vec!["Error: no such container ghost"]);
}

#[tokio::test]
async fn log_lines_stream_in_order_before_the_terminal_status() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(&dir, "for i in 1 2 3 4 5; do echo \"line $i\"; done");
    let engine = engine_with(&tool);

    let mut rx = engine.subscribe();
    let id = engine.submit(stop_op("devbox")).await.unwrap();

    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event stream stalled")
            .expect("event stream closed");
        if event.task_id() != id {
            continue;
        }
        let terminal = matches!(
            event,
            TaskEvent::StatusChanged { to, .. } if to.is_terminal()
        );
        events.push(event);
        if terminal {
            break;
        }
    }

    assert!(matches!(events[0], TaskEvent::Created(_)));
    assert!(matches!(
        events[1],
        TaskEvent::StatusChanged {
            from: TaskStatus::Pending,
            to: TaskStatus::Running,
            ..
        }
    ));
    assert!(matches!(
        events.last().unwrap(),
        TaskEvent::StatusChanged {
            to: TaskStatus::Succeeded,
            ..
        }
    ));

    // Everything between start and finish is log lines with dense sequence
    // numbers, and they all arrive before the terminal status
    let streamed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::LogAppended { line, .. } => Some(line.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(events.len(), streamed.len() + 3);
    for (index, line) in streamed.iter().enumerate() {
        assert_eq!(line.seq, index as u64 + 1);
    }

    let stdout_texts: Vec<&str> = streamed
        .iter()
        .filter(|line| line.source == LogSource::Stdout)
        .map(|line| line.text.as_str())
        .collect();
    assert_eq!(
        stdout_texts,
        vec!["line 1", "line 2", "line 3", "line 4", "line 5"]
    );

    // The final snapshot holds the same lines the stream delivered
    let task = engine.get(id).await.unwrap();
    assert_eq!(task.log, streamed);
}

#[tokio::test]
async fn cancel_before_start_never_spawns_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let tool = fake_tool(&dir, &format!("touch {}", marker.display()));
    let engine = engine_with(&tool);

    let mut rx = engine.subscribe();
    let id = engine.submit(stop_op("devbox")).await.unwrap();

    // On the single-threaded test runtime the run unit has not polled yet
    let snapshot = engine.get(id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Pending);

    engine.cancel(id).await.unwrap();
    let task = engine.wait(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(
        task.exit,
        Some(ExitInfo::Cancelled(CancelReason::BeforeStart))
    );
    assert!(task.started_at.is_none());
    assert!(task.log.is_empty());
    assert!(!marker.exists(), "process ran despite pre-start cancel");

    // Only two events: creation and the jump to Cancelled
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[0], TaskEvent::Created(_)));
    assert!(matches!(
        seen[1],
        TaskEvent::StatusChanged {
            from: TaskStatus::Pending,
            to: TaskStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn cancel_terminates_a_cooperative_process_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "trap 'exit 0' TERM\nsleep 30 >/dev/null 2>&1 &\nwait $!",
    );
    let engine = engine_with(&tool);

    let id = engine.submit(stop_op("devbox")).await.unwrap();
    wait_until_running(&engine, id).await;

    let started = Instant::now();
    engine.cancel(id).await.unwrap();
    let task = engine.wait(id).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(
        task.exit,
        Some(ExitInfo::Cancelled(CancelReason::Terminated))
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "termination took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn cancel_escalates_to_kill_after_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    // Ignores the termination signal and would run for 30 seconds
    let tool = fake_tool(&dir, "trap '' TERM\nsleep 30 >/dev/null 2>&1");
    let engine = TaskEngine::new(
        EngineConfig::default()
            .with_tool(&tool)
            .with_grace_period(Duration::from_secs(1)),
    );

    let id = engine.submit(stop_op("stubborn")).await.unwrap();
    wait_until_running(&engine, id).await;
    sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    engine.cancel(id).await.unwrap();
    let task = engine.wait(id).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.exit, Some(ExitInfo::Cancelled(CancelReason::Killed)));
    assert!(
        elapsed >= Duration::from_millis(900),
        "kill came before the grace period: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(1900),
        "kill escalation took {:?}",
        elapsed
    );
    assert!(task
        .log
        .iter()
        .any(|line| line.source == LogSource::System && line.text.contains("killing")));
}

#[tokio::test]
async fn launch_failure_marks_the_task_failed() {
    let engine = engine_with("/nonexistent/bin/boxtool");
    let id = engine.submit(stop_op("devbox")).await.unwrap();
    let task = engine.wait(id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(matches!(task.exit, Some(ExitInfo::LaunchFailed(_))));
    assert!(task
        .log
        .iter()
        .any(|line| line.source == LogSource::System && line.text.contains("failed to start")));
}

#[tokio::test]
async fn shutdown_cancels_all_active_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "trap 'exit 0' TERM\nsleep 30 >/dev/null 2>&1 &\nwait $!",
    );
    let engine = engine_with(&tool);

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        ids.push(engine.submit(stop_op(name)).await.unwrap());
    }
    for id in &ids {
        wait_until_running(&engine, *id).await;
    }

    let started = Instant::now();
    engine.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(engine.list_active().await.is_empty());
    for id in ids {
        let task = engine.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(
            task.exit,
            Some(ExitInfo::Cancelled(CancelReason::Shutdown))
        );
    }
}

#[tokio::test]
async fn concurrent_tasks_run_independently() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "if [ \"$2\" = \"slow\" ]; then sleep 30 >/dev/null 2>&1; fi\necho \"done $2\"",
    );
    let engine = engine_with(&tool);

    let slow = engine.submit(stop_op("slow")).await.unwrap();
    let quick = engine.submit(stop_op("quick")).await.unwrap();

    // The quick task finishes while the slow one is still running
    let task = engine.wait(quick).await.unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert!(engine.get(slow).await.unwrap().status.is_active());

    engine.shutdown().await;
    assert!(engine.get(slow).await.unwrap().status.is_terminal());
}

#[tokio::test]
async fn clear_ended_keeps_active_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "if [ \"$2\" = \"slow\" ]; then trap 'exit 0' TERM; sleep 30 >/dev/null 2>&1 & wait $!; fi",
    );
    let engine = engine_with(&tool);

    let quick = engine.submit(stop_op("quick")).await.unwrap();
    engine.wait(quick).await.unwrap();
    let slow = engine.submit(stop_op("slow")).await.unwrap();
    wait_until_running(&engine, slow).await;

    assert_eq!(engine.clear_ended().await, 1);
    assert!(engine.get(quick).await.is_err());
    assert!(engine.get(slow).await.is_ok());

    engine.shutdown().await;
}

#[tokio::test]
async fn list_containers_parses_the_tool_output() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "if [ \"$1\" = \"ls\" ]; then\n\
         printf 'ID | NAME | STATUS | IMAGE\\n'\n\
         printf 'abc123 | devbox | Up 2 hours | docker.io/library/ubuntu:24.04\\n'\n\
         printf 'def456 | workbox | Created | registry.fedoraproject.org/fedora-toolbox:40\\n'\n\
         fi",
    );
    let engine = engine_with(&tool);

    let containers = engine.list_containers().await.unwrap();
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].name, "devbox");
    assert_eq!(containers[0].status, "Up 2 hours");
    assert_eq!(containers[0].distro.as_ref().unwrap().name, "ubuntu");
    assert_eq!(containers[1].distro.as_ref().unwrap().name, "fedora");
}

#[tokio::test]
async fn list_exportable_apps_reports_export_state() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        &dir,
        "if [ \"$1\" = \"enter\" ]; then\n\
         echo 'EXPORTED_APPS:'\n\
         echo \"$HOME/.local/share/applications/devbox-firefox.desktop\"\n\
         echo 'DESKTOP_FILES:'\n\
         echo '# START FILE /usr/share/applications/firefox.desktop'\n\
         echo '[Desktop Entry]'\n\
         echo 'Name=Firefox'\n\
         echo '# START FILE /usr/share/applications/calc.desktop'\n\
         echo '[Desktop Entry]'\n\
         echo 'Name=Calculator'\n\
         fi",
    );
    let engine = engine_with(&tool);

    let apps = engine.list_exportable_apps("devbox").await.unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0].name, "Firefox");
    assert!(apps[0].exported);
    assert_eq!(apps[1].name, "Calculator");
    assert!(!apps[1].exported);
}

#[tokio::test]
async fn failed_inventory_query_surfaces_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(&dir, "echo 'cannot reach podman' >&2\nexit 125");
    let engine = engine_with(&tool);

    let err = engine.list_containers().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("125"), "unexpected error: {}", message);
    assert!(
        message.contains("cannot reach podman"),
        "unexpected error: {}",
        message
    );
}

#[tokio::test]
async fn session_child_is_reaped_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("session.pid");
    let engine = engine_with("unused");

    let argv = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("echo $$ > {}", pid_file.display()),
    ];
    engine.spawn_session(argv).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let pid = loop {
        if let Ok(text) = fs::read_to_string(&pid_file) {
            if let Ok(pid) = text.trim().parse::<u32>() {
                break pid;
            }
        }
        assert!(Instant::now() < deadline, "session never reported its pid");
        sleep(Duration::from_millis(10)).await;
    };

    // Once the exited shell is reaped its /proc entry disappears; left
    // unreaped it stays in state Z with this process as parent.
    loop {
        let stat = match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat,
            Err(_) => break,
        };
        let after = stat.rfind(')').map(|i| &stat[i + 1..]).unwrap_or("");
        let mut fields = after.split_whitespace();
        let state = fields.next().unwrap_or("");
        let parent: u32 = fields.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        if parent != std::process::id() || state != "Z" {
            break;
        }
        assert!(Instant::now() < deadline, "session child was never reaped");
        sleep(Duration::from_millis(25)).await;
    }
}
