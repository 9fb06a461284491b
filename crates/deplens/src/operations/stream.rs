//! Push-style status updates over the polling API.

use super::OperationManager;
use super::operation::OperationStatus;
use futures::Stream;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Envelope written by a transport for each streamed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamUpdate {
    /// Always `true`; marks the message as an unsolicited update.
    pub streaming_update: bool,
    /// The status snapshot.
    pub data: OperationStatus,
    /// The operation the update belongs to.
    pub request_id: String,
    /// The operation's correlation id.
    pub correlation_id: String,
}

impl From<OperationStatus> for StreamUpdate {
    fn from(status: OperationStatus) -> Self {
        Self {
            streaming_update: true,
            request_id: status.operation_id.clone(),
            correlation_id: status.correlation_id.clone(),
            data: status,
        }
    }
}

struct WatchState {
    manager: OperationManager,
    id: String,
    interval: Duration,
    last_revision: Option<u64>,
    finished: bool,
}

impl OperationManager {
    /// Follow operation `id` as a stream of status snapshots.
    ///
    /// The current snapshot is yielded immediately. After that the status is
    /// polled every `interval` and yielded only when it changed. The stream
    /// ends after yielding a terminal snapshot, or as soon as the operation
    /// is no longer registered. Dropping the stream stops polling.
    pub fn watch(
        &self,
        id: &str,
        interval: Duration,
    ) -> impl Stream<Item = OperationStatus> + Send + 'static {
        let state = WatchState {
            manager: self.clone(),
            id: id.to_string(),
            interval,
            last_revision: None,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            loop {
                if state.last_revision.is_some() {
                    tokio::time::sleep(state.interval).await;
                }

                let status = match state.manager.get_status(&state.id) {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::debug!(operation_id = %state.id, error = %e, "Watch ended");
                        return None;
                    }
                };

                if state.last_revision == Some(status.revision) {
                    continue;
                }

                state.last_revision = Some(status.revision);
                state.finished = status.is_terminal();
                return Some((status, state));
            }
        })
    }

    /// [`watch`](Self::watch), wrapped in [`StreamUpdate`] envelopes.
    pub fn stream_updates(
        &self,
        id: &str,
        interval: Duration,
    ) -> impl Stream<Item = StreamUpdate> + Send + 'static {
        futures::StreamExt::map(self.watch(id, interval), StreamUpdate::from)
    }
}
