//! Membership refresher
//!
//! Each refresh cycle:
//! 1. resolves this node's identity from the directory (never cached)
//! 2. publishes all configured nodes, then the enabled ones
//!    (active nodes that are no longer enabled drop out here)
//! 3. for a full refresh: marks this node active, fans out one independent `NodeHealth.ping` probe per other
//!    enabled node and elects the master from the enabled set
//! 4. advances the update time
//!
//! Probes run as spawned tasks and fold their own result into the cluster
//! state. `refresh` returns once they are submitted; the returned
//! [`RefreshHandle`] can be awaited for the settled outcome.
//!
//! The first cycle waits out a quiet period so peers can finish booting.
//! [`MembershipRefresher::interrupt`] cancels that wait (the cycle is then
//! abandoned without touching the state) and stops the periodic loop.

use crate::cluster::state::{ClusterState, ProbeRecord};
use crate::cluster::{NodeDirectory, NodeId};
use crate::common::{Error, Result};
use crate::rpc::{Arguments, CallRouter, NODE_HEALTH_SERVICE, NODE_ID_TYPE, PING_OPERATION};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// What a refresh cycle covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Membership, reachability probes and master election
    Full,
    /// Membership lists only
    MembershipOnly,
}

impl RefreshMode {
    pub fn tests_reachability(&self) -> bool {
        matches!(self, RefreshMode::Full)
    }
}

/// Pick the master: the highest priority wins, and among equals the first
/// one in `nodes` order.
pub fn elect_master<'a>(
    nodes: impl IntoIterator<Item = &'a NodeId>,
    priority: impl Fn(&NodeId) -> i32,
) -> Option<NodeId> {
    let mut best: Option<(&NodeId, i32)> = None;
    for node in nodes {
        let p = priority(node);
        if best.map_or(true, |(_, max)| p > max) {
            best = Some((node, p));
        }
    }
    best.map(|(node, _)| node.clone())
}

/// Result of one probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub node: NodeId,
    pub record: ProbeRecord,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        self.record.is_success()
    }
}

/// Probes submitted by one refresh cycle.
///
/// Dropping the handle leaves the probes running.
#[derive(Debug, Default)]
pub struct RefreshHandle {
    probes: Vec<JoinHandle<ProbeOutcome>>,
}

impl RefreshHandle {
    /// Number of probes submitted.
    pub fn submitted(&self) -> usize {
        self.probes.len()
    }

    /// Wait until every probe has folded its result into the cluster state.
    ///
    /// With a `bound`, gives up after that long; the probes keep running.
    pub async fn settled(self, bound: Option<Duration>) -> Result<Vec<ProbeOutcome>> {
        let joined = futures_util::future::join_all(self.probes);
        let results = match bound {
            Some(bound) => tokio::time::timeout(bound, joined)
                .await
                .map_err(|_| Error::Timeout(format!("probes still pending after {:?}", bound)))?,
            None => joined.await,
        };

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Probe task failed: {}", e),
            }
        }
        Ok(outcomes)
    }
}

pub struct MembershipRefresher {
    directory: Arc<dyn NodeDirectory>,
    router: Arc<CallRouter>,
    state: Arc<ClusterState>,
    quiet_period: Duration,
    quiet_period_done: AtomicBool,
    interrupted: watch::Sender<bool>,
    /// Held for the duration of a cycle; cycles never overlap.
    cycle: Mutex<()>,
}

impl MembershipRefresher {
    pub fn new(
        directory: Arc<dyn NodeDirectory>,
        router: Arc<CallRouter>,
        state: Arc<ClusterState>,
        quiet_period: Duration,
    ) -> Self {
        let (interrupted, _) = watch::channel(false);
        Self {
            directory,
            router,
            state,
            quiet_period,
            quiet_period_done: AtomicBool::new(quiet_period.is_zero()),
            interrupted,
            cycle: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    /// Cancel a pending quiet period and stop the periodic loop.
    ///
    /// The flag stays set.
    pub fn interrupt(&self) {
        self.interrupted.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.borrow()
    }

    /// Run one refresh cycle.
    pub async fn refresh(&self, mode: RefreshMode) -> Result<RefreshHandle> {
        self.await_quiet_period().await?;
        let _cycle = self.cycle.lock().await;

        let this_node = self.directory.this_node();

        let all_nodes: BTreeSet<NodeId> = self.directory.list_all()?.into_iter().collect();
        let enabled_nodes: BTreeSet<NodeId> = all_nodes
            .iter()
            .filter(|n| self.directory.is_enabled(n))
            .cloned()
            .collect();
        self.state.publish_all_nodes(all_nodes);
        self.state.publish_enabled_nodes(enabled_nodes.clone());

        let mut handle = RefreshHandle::default();
        if mode.tests_reachability() {
            for node in &enabled_nodes {
                if *node == this_node {
                    self.state.mark_active(node, ProbeRecord::success(Duration::ZERO));
                } else {
                    handle.probes.push(self.spawn_probe(&this_node, node));
                }
            }

            let master = elect_master(&enabled_nodes, |n| self.directory.priority(n));
            if master != self.state.snapshot().master_node {
                tracing::info!(
                    "Master node is now {}",
                    master.as_ref().map_or("(none)", |m| m.as_str())
                );
            }
            self.state.publish_master(master);
        }

        let update_time = self.state.touch();
        tracing::debug!(
            "Membership refreshed at {} ({} enabled, {} probes submitted)",
            update_time,
            enabled_nodes.len(),
            handle.submitted()
        );
        Ok(handle)
    }

    /// Spawn the periodic refresh loop.
    pub fn start(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(interval).await })
    }

    async fn run(&self, interval: Duration) {
        tracing::info!("Membership refresher started (every {:?})", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut interrupted = self.interrupted.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = interrupted.wait_for(|flag| *flag) => break,
            }

            match self.refresh(RefreshMode::Full).await {
                Ok(_) => {}
                Err(Error::Interrupted) => break,
                Err(e) => tracing::error!("Membership refresh failed: {}", e),
            }
        }
        tracing::info!("Membership refresher stopped");
    }

    async fn await_quiet_period(&self) -> Result<()> {
        if self.quiet_period_done.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut interrupted = self.interrupted.subscribe();
        if *interrupted.borrow_and_update() {
            return Err(Error::Interrupted);
        }

        tracing::info!("Waiting {:?} before the first probe wave", self.quiet_period);
        tokio::select! {
            _ = tokio::time::sleep(self.quiet_period) => {
                self.quiet_period_done.store(true, Ordering::Release);
                Ok(())
            }
            _ = interrupted.wait_for(|flag| *flag) => {
                tracing::info!("Quiet period interrupted, skipping refresh");
                Err(Error::Interrupted)
            }
        }
    }

    fn spawn_probe(&self, source: &NodeId, target: &NodeId) -> JoinHandle<ProbeOutcome> {
        let router = self.router.clone();
        let state = self.state.clone();
        let source = source.clone();
        let target = target.clone();

        tokio::spawn(async move {
            let args = Arguments::new().with(NODE_ID_TYPE, Value::String(source.to_string()));
            let started = Instant::now();
            let result = router
                .call(&source, Some(&target), NODE_HEALTH_SERVICE, PING_OPERATION, args)
                .await;

            let record = match result {
                Ok(_) => {
                    let record = ProbeRecord::success(started.elapsed());
                    tracing::debug!("Node {} answered ping", target);
                    state.mark_active(&target, record.clone());
                    record
                }
                Err(e) => {
                    tracing::warn!("Node {} failed ping: {}", target, e);
                    let record = ProbeRecord::failure(e.to_string());
                    state.mark_inactive(&target, record.clone());
                    record
                }
            };
            ProbeOutcome {
                node: target,
                record,
            }
        })
    }
}
