//! Reader adapter: one decoded payload per input line.
//!
//! A camera/QR decoder in front of the station writes each decoded payload
//! as a line; the reader feeds it to the validator and answers with a short
//! status line for the operator display.

use std::sync::Arc;

use rollcall_types::Timestamp;
use rollcall_validator::{PresentationValidator, Verdict};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::shutdown::ShutdownSignal;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub lines: u64,
    pub accepted: u64,
    pub errors: u64,
}

/// Run until the input ends or shutdown is signalled.
pub async fn run_reader<R, W>(
    validator: Arc<PresentationValidator>,
    input: R,
    mut output: W,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<ReaderStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut stats = ReaderStats::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.triggered() => break,
        };
        let Some(line) = line else {
            tracing::info!("input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let status = match validator.validate(&line, Timestamp::now()).await {
            Ok(verdict) => {
                if verdict.is_accepted() {
                    stats.accepted += 1;
                }
                status_line(&verdict)
            }
            Err(e) => {
                stats.errors += 1;
                if e.is_transient() {
                    "TRANSIENT_ERROR (retry)".to_string()
                } else {
                    format!("ERROR {e}")
                }
            }
        };
        output.write_all(status.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }

    Ok(stats)
}

fn status_line(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Accepted { record, .. } => format!(
            "ACCEPTED {} {} ({})",
            record.identity_id, record.display_name, record.group_label
        ),
        Verdict::Malformed(e) => format!("MALFORMED {e}"),
        other => match other.identity_id() {
            Some(id) => format!("{} {id}", other.outcome()),
            None => other.outcome().to_string(),
        },
    }
}
