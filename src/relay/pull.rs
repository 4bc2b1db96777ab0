//! On-demand relay pull
//!
//! When a subscriber arrives for a stream with no publisher and a pull
//! URL template is configured, the manager starts a pull client that
//! acts as a virtual publisher. It lives until the last subscriber
//! leaves or a local publisher preempts it; failures retry with
//! exponential backoff capped at 30 seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::group::group::{Group, PublisherHandle};
use crate::group::session::{SessionId, SessionProtocol};

use super::ConnectorFuture;

/// Dials the upstream and publishes into the group until the upstream
/// ends or fails. Supplied by the embedding server.
pub type PullConnector = Arc<dyn Fn(String, PublisherHandle) -> ConnectorFuture + Send + Sync>;

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Retry delay for the n-th failed attempt: 1, 2, 4, 8, 16, 30, 30, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(BACKOFF_CAP)
}

/// The pull client loop; runs as a group-owned task.
pub(crate) async fn run_pull_loop(
    group: Arc<Group>,
    url: String,
    connector: PullConnector,
    session_counter: Arc<AtomicU64>,
) {
    let mut attempt: u32 = 0;
    loop {
        if group.subscriber_count().await == 0 {
            debug!(stream = %group.name(), "pull abandoned: no subscribers remain");
            break;
        }

        let id = SessionId(session_counter.fetch_add(1, Ordering::Relaxed));
        match group
            .attach_publisher(id, SessionProtocol::RelayPull)
            .await
        {
            Err(_) => {
                // A local publisher took the slot; it wins.
                debug!(stream = %group.name(), "pull stopped: publisher present");
                break;
            }
            Ok(()) => {
                info!(stream = %group.name(), url = %url, attempt, "pull session starting");
                let handle = PublisherHandle::new(group.clone(), id, SessionProtocol::RelayPull);
                let result = connector(url.clone(), handle).await;
                group.detach_publisher(id).await;

                match result {
                    Ok(()) => {
                        info!(stream = %group.name(), "pull session ended");
                        attempt = 0;
                    }
                    Err(e) => {
                        warn!(stream = %group.name(), error = %e, "pull session failed");
                    }
                }
            }
        }

        if group.subscriber_count().await == 0 {
            break;
        }
        let delay = backoff_delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(stream = %group.name(), delay_secs = delay.as_secs(), "pull retry scheduled");
        tokio::time::sleep(delay).await;
    }
    group.clear_pull_task().await;
}
