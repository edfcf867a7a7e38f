//! Event feed replay.

use super::controller::SrController;
use super::events::FabricEvent;
use super::fabric::MemoryFabric;
use crate::error::Result;
use log::{debug, warn};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub events: u64,
    pub malformed: u64,
}

/// Feeds newline-delimited JSON events to `controller`.
///
/// Each event is applied to `fabric` first, then submitted, and the
/// controller is flushed before the next line is read so that store updates
/// never overtake queued handler work. Blank lines and lines starting with
/// `#` are ignored; malformed lines are logged and skipped.
pub async fn replay<R>(
    controller: &SrController,
    fabric: &MemoryFabric,
    reader: R,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: FabricEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("srcontrollerd: skipping line {}: {}", line_no, e);
                summary.malformed += 1;
                continue;
            }
        };

        debug!("srcontrollerd: line {}: {:?}", line_no, event);
        fabric.apply(&event);
        controller.submit(event)?;
        controller.flush().await;
        summary.events += 1;
    }

    Ok(summary)
}
