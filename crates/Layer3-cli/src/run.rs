//! Non-interactive operation runner
//!
//! Submits one operation and streams its task to the console until the
//! task reaches a terminal status.

use boxforge_task::{LogSource, Operation, TaskEngine, TaskEvent, TaskStatus};
use tokio::sync::broadcast::error::RecvError;

/// Run `op` to completion, echoing its log as it arrives.
///
/// Process stdout goes to stdout; process stderr and engine notes go to
/// stderr. Ctrl-C cancels the task, and the process exits with 130 once
/// the cancellation lands, matching shell convention for interrupted
/// commands. Any final status other than Succeeded is an error.
pub async fn run_operation(engine: &TaskEngine, op: Operation) -> anyhow::Result<()> {
    // Subscribe before submitting so no early line can slip past.
    let mut events = engine.subscribe();
    let id = engine.submit(op).await?;

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TaskEvent::LogAppended { id: event_id, line }) if event_id == id => {
                    match line.source {
                        LogSource::Stdout => println!("{}", line.text),
                        LogSource::Stderr => eprintln!("{}", line.text),
                        LogSource::System => eprintln!("* {}", line.text),
                    }
                }
                Ok(TaskEvent::StatusChanged { id: event_id, to, .. })
                    if event_id == id && to.is_terminal() =>
                {
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("* event stream lagged, {} events skipped", skipped);
                    // The terminal transition may be among the skipped events.
                    if engine.get(id).await?.status.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    anyhow::bail!("engine event stream closed unexpectedly");
                }
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                eprintln!("* interrupt received, cancelling");
                engine.cancel(id).await?;
            }
        }
    }

    let task = engine.get(id).await?;
    match task.status {
        TaskStatus::Succeeded => Ok(()),
        TaskStatus::Cancelled => std::process::exit(130),
        _ => {
            let detail = task
                .exit
                .as_ref()
                .map(|exit| exit.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());
            anyhow::bail!("{} failed: {}", task.kind().display_name(), detail)
        }
    }
}
