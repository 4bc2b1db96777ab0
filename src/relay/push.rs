//! Static relay push
//!
//! For each configured push template, the manager starts a push client
//! when a publisher attaches. The client is a virtual subscriber: it
//! receives the normalized stream through an ordinary subscriber queue
//! and forwards it upstream. It retries with the pull backoff while the
//! publisher is live and ends when the publisher goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::group::group::Group;
use crate::group::session::{SessionId, SessionProtocol};
use crate::group::subscriber::SubscriberHandle;

use super::pull::backoff_delay;
use super::ConnectorFuture;

/// Dials the downstream target and forwards frames from the handle
/// until the stream ends or the connection fails.
pub type PushConnector = Arc<dyn Fn(String, SubscriberHandle) -> ConnectorFuture + Send + Sync>;

/// The push client loop; one per configured target.
pub(crate) async fn run_push_loop(
    group: Arc<Group>,
    url: String,
    connector: PushConnector,
    session_counter: Arc<AtomicU64>,
) {
    let mut attempt: u32 = 0;
    loop {
        if !group.has_publisher().await {
            debug!(stream = %group.name(), url = %url, "push stopped: no publisher");
            break;
        }

        let id = SessionId(session_counter.fetch_add(1, Ordering::Relaxed));
        let handle = group
            .attach_subscriber(id, SessionProtocol::RelayPush)
            .await;
        info!(stream = %group.name(), url = %url, attempt, "push session starting");

        let result = connector(url.clone(), handle).await;
        group.detach_subscriber(id).await;

        match result {
            Ok(()) => {
                info!(stream = %group.name(), url = %url, "push session ended");
                attempt = 0;
            }
            Err(e) => {
                warn!(stream = %group.name(), url = %url, error = %e, "push session failed");
            }
        }

        if !group.has_publisher().await {
            break;
        }
        let delay = backoff_delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}
