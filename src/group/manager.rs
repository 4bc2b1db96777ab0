//! The server manager: stream name → group
//!
//! Owns the group map, creates groups lazily on first reference, and
//! destroys them from the maintenance tick once they have been empty
//! past the idle timeout. Map mutations serialize on the manager lock;
//! everything per-stream serializes on the group's own lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::relay::pull::{run_pull_loop, PullConnector};
use crate::relay::push::{run_push_loop, PushConnector};
use crate::stats::ServerStats;

use super::config::GroupConfig;
use super::group::{Group, PublisherHandle};
use super::observer::{AllowAll, GroupObserver, StreamAuth};
use super::session::{SessionId, SessionProtocol};
use super::subscriber::SubscriberHandle;

/// Owns all groups and the background maintenance tick
pub struct ServerManager {
    config: GroupConfig,
    groups: Mutex<HashMap<String, Arc<Group>>>,
    auth: Arc<dyn StreamAuth>,
    observer: Option<Arc<dyn GroupObserver>>,
    pull_connector: Option<PullConnector>,
    push_connector: Option<PushConnector>,
    session_counter: Arc<AtomicU64>,
    groups_created: AtomicU64,
    groups_destroyed: AtomicU64,
}

impl ServerManager {
    pub fn new(config: GroupConfig) -> Self {
        Self {
            config,
            groups: Mutex::new(HashMap::new()),
            auth: Arc::new(AllowAll),
            observer: None,
            pull_connector: None,
            push_connector: None,
            session_counter: Arc::new(AtomicU64::new(1)),
            groups_created: AtomicU64::new(0),
            groups_destroyed: AtomicU64::new(0),
        }
    }

    /// Install an authentication hook
    pub fn auth(mut self, auth: Arc<dyn StreamAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Install a session observer, shared by all groups
    pub fn observer(mut self, observer: Arc<dyn GroupObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Install the pull connector used for on-demand relay pull
    pub fn pull_connector(mut self, connector: PullConnector) -> Self {
        self.pull_connector = Some(connector);
        self
    }

    /// Install the push connector used for static relay push
    pub fn push_connector(mut self, connector: PushConnector) -> Self {
        self.push_connector = Some(connector);
        self
    }

    /// Allocate a process-unique session id for a front-end session.
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.session_counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Attach a publisher, creating the group if absent.
    ///
    /// Fails with [`crate::Error::Conflict`] when the stream already has
    /// a publisher (an active relay pull is preempted instead).
    pub async fn attach_publisher(
        &self,
        stream_name: &str,
        session_id: SessionId,
        protocol: SessionProtocol,
    ) -> Result<PublisherHandle> {
        self.auth.on_publish(stream_name, session_id)?;
        let group = self.ensure_group(stream_name).await;
        group.attach_publisher(session_id, protocol).await?;

        // Static push fan-copy starts with the publisher.
        if let Some(connector) = &self.push_connector {
            for template in &self.config.push_url_templates {
                let url = GroupConfig::expand_template(template, stream_name);
                tokio::spawn(run_push_loop(
                    group.clone(),
                    url,
                    connector.clone(),
                    self.session_counter.clone(),
                ));
            }
        }

        Ok(PublisherHandle::new(group, session_id, protocol))
    }

    /// Attach a subscriber, creating the group if absent and starting an
    /// on-demand pull when configured and no publisher exists.
    pub async fn attach_subscriber(
        &self,
        stream_name: &str,
        session_id: SessionId,
        protocol: SessionProtocol,
    ) -> Result<SubscriberHandle> {
        self.auth.on_subscribe(stream_name, session_id)?;
        let group = self.ensure_group(stream_name).await;
        let handle = group.attach_subscriber(session_id, protocol).await;

        if let (Some(template), Some(connector)) =
            (&self.config.pull_url_template, &self.pull_connector)
        {
            if !group.has_publisher().await && !group.pull_active().await {
                let url = GroupConfig::expand_template(template, stream_name);
                info!(stream = %stream_name, url = %url, "starting on-demand pull");
                let task = tokio::spawn(run_pull_loop(
                    group.clone(),
                    url,
                    connector.clone(),
                    self.session_counter.clone(),
                ));
                group.set_pull_task(task).await;
            }
        }

        Ok(handle)
    }

    /// Detach a publisher by session id.
    pub async fn detach_publisher(&self, stream_name: &str, session_id: SessionId) {
        if let Some(group) = self.group(stream_name).await {
            group.detach_publisher(session_id).await;
        }
    }

    /// Detach a subscriber by session id.
    pub async fn detach_subscriber(&self, stream_name: &str, session_id: SessionId) {
        if let Some(group) = self.group(stream_name).await {
            group.detach_subscriber(session_id).await;
        }
    }

    /// Look up an existing group.
    pub async fn group(&self, stream_name: &str) -> Option<Arc<Group>> {
        self.groups.lock().await.get(stream_name).cloned()
    }

    pub async fn group_count(&self) -> usize {
        self.groups.lock().await.len()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            groups_created: self.groups_created.load(Ordering::Relaxed),
            groups_destroyed: self.groups_destroyed.load(Ordering::Relaxed),
            sessions_issued: self.session_counter.load(Ordering::Relaxed).saturating_sub(1),
        }
    }

    /// One maintenance pass: destroy groups that are empty and idle past
    /// the timeout. Groups whose lock is held are skipped this round.
    pub async fn tick(&self) {
        let idle_timeout = self.config.group_idle_timeout;
        let expired: Vec<Arc<Group>> = {
            let mut groups = self.groups.lock().await;
            let names: Vec<String> = groups
                .iter()
                .filter(|(_, g)| g.try_expendable(idle_timeout))
                .map(|(name, _)| name.clone())
                .collect();
            names
                .iter()
                .filter_map(|name| groups.remove(name))
                .collect()
        };

        for group in expired {
            group.destroy().await;
            self.groups_destroyed.fetch_add(1, Ordering::Relaxed);
        }

        let stats = self.stats();
        let groups = self.group_count().await;
        debug!(
            groups = groups,
            created = stats.groups_created,
            destroyed = stats.groups_destroyed,
            "manager tick"
        );
    }

    /// Background tick, once per second. Abort the handle to stop it.
    pub fn spawn_tick_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                manager.tick().await;
            }
        })
    }

    async fn ensure_group(&self, stream_name: &str) -> Arc<Group> {
        let mut groups = self.groups.lock().await;
        if let Some(group) = groups.get(stream_name) {
            return group.clone();
        }
        let group = Group::new(stream_name, self.config.clone(), self.observer.clone());
        groups.insert(stream_name.to_string(), group.clone());
        self.groups_created.fetch_add(1, Ordering::Relaxed);
        info!(stream = %stream_name, "group created");
        group
    }
}
