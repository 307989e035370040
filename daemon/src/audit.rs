//! Append-only audit log of presentation events.
//!
//! Each event becomes one JSON line. Write failures are logged and the event
//! is dropped; the audit log never holds up validation.

use std::path::Path;

use rollcall_validator::PresentationEvent;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::shutdown::ShutdownSignal;

#[derive(Serialize)]
struct AuditLine<'a> {
    #[serde(flatten)]
    event: &'a PresentationEvent,
    /// Wire-format rendering of `timestamp`, for people reading the file.
    time: String,
}

/// Consume events until shutdown or until the bus closes. Returns the number
/// of lines written.
pub async fn run_audit_log(
    path: &Path,
    mut events: broadcast::Receiver<PresentationEvent>,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut written = 0u64;
    tracing::info!(path = %path.display(), "audit log open");

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => written += append(&mut file, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "audit log fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.triggered() => {
                // Drain what was emitted before shutdown.
                loop {
                    match events.try_recv() {
                        Ok(event) => written += append(&mut file, &event).await,
                        Err(TryRecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "audit log fell behind, events dropped");
                        }
                        Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = file.flush().await {
        tracing::warn!(error = %e, "audit log flush failed");
    }
    tracing::debug!(written, "audit log closed");
    Ok(written)
}

async fn append(file: &mut tokio::fs::File, event: &PresentationEvent) -> u64 {
    let line = AuditLine {
        event,
        time: event
            .timestamp
            .to_wire()
            .unwrap_or_else(|_| event.timestamp.as_secs().to_string()),
    };
    let mut json = match serde_json::to_string(&line) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "cannot serialize audit event");
            return 0;
        }
    };
    json.push('\n');
    match file.write_all(json.as_bytes()).await {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(
                error = %e,
                outcome = %event.outcome,
                "audit write failed, event dropped"
            );
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::{ShutdownController, ShutdownReason};
    use rollcall_types::{IdentityId, Outcome, Timestamp};
    use rollcall_validator::EventBus;

    fn event(outcome: Outcome) -> PresentationEvent {
        PresentationEvent {
            outcome,
            identity_id: Some(IdentityId::new("S001")),
            display_name: "Jo".into(),
            group_label: "A".into(),
            timestamp: Timestamp::new(1_709_296_205),
            detail: None,
        }
    }

    #[tokio::test]
    async fn writes_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_log.jsonl");
        let bus = EventBus::new(16);
        let controller = ShutdownController::new();
        let events = bus.subscribe();

        bus.emit(event(Outcome::Accepted));
        bus.emit(event(Outcome::Duplicate));
        controller.shutdown(ShutdownReason::InputClosed);

        let written = run_audit_log(&path, events, controller.subscribe()).await.unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["outcome"], "ACCEPTED");
        assert_eq!(lines[0]["time"], "2024-03-01 12:30:05");
        assert_eq!(lines[1]["outcome"], "DUPLICATE");
    }

    #[tokio::test]
    async fn appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_log.jsonl");

        for _ in 0..2 {
            let bus = EventBus::new(16);
            let controller = ShutdownController::new();
            let events = bus.subscribe();
            bus.emit(event(Outcome::Stale));
            controller.shutdown(ShutdownReason::InputClosed);
            run_audit_log(&path, events, controller.subscribe()).await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn stops_when_bus_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(16);
        let events = bus.subscribe();
        let controller = ShutdownController::new();
        drop(bus);
        let written = run_audit_log(&dir.path().join("log"), events, controller.subscribe())
            .await
            .unwrap();
        assert_eq!(written, 0);
    }
}
