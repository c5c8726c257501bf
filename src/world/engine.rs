//! The [`World`] handle: shared registry, rooms, dispatch and counters.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::{error, warn};
use parking_lot::Mutex;

use super::aggregate::Tuning;
use super::dispatch::{Dispatch, Outstanding, Rejected, WorkerPool};
use super::errors::WorldError;
use super::node::Node;
use super::registry::Registry;
use super::types::NodeId;
use crate::config::WorldConfig;
use crate::metrics::{Snapshot, WorldMetrics};

pub(crate) struct Shared {
    pub(crate) registry: Registry,
    pub(crate) rooms: Mutex<IndexMap<NodeId, Arc<Node>>>,
    pub(crate) dispatcher: Box<dyn Dispatch>,
    pub(crate) outstanding: Outstanding,
    pub(crate) metrics: WorldMetrics,
    pub(crate) tuning: Tuning,
}

/// Cheap, cloneable handle to one containment world.
#[derive(Clone)]
pub struct World {
    pub(crate) shared: Arc<Shared>,
}

impl World {
    /// World backed by a worker pool sized from `config`.
    pub fn new(config: &WorldConfig) -> Result<Self, WorldError> {
        let pool = WorkerPool::new(config.dispatch_threads, "world-dispatch")?;
        Ok(Self::with_dispatcher(config.tuning(), pool))
    }

    /// World delivering notifications through a caller-supplied sink.
    pub fn with_dispatcher<D: Dispatch>(tuning: Tuning, dispatcher: D) -> Self {
        World {
            shared: Arc::new(Shared {
                registry: Registry::default(),
                rooms: Mutex::new(IndexMap::new()),
                dispatcher: Box::new(dispatcher),
                outstanding: Outstanding::default(),
                metrics: WorldMetrics::new(),
                tuning,
            }),
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.shared.tuning
    }

    pub(crate) fn stall(&self) -> Duration {
        self.shared.tuning.stall_warning
    }

    pub fn metrics(&self) -> Snapshot {
        self.shared.metrics.snapshot()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// The node with this id, unless it has been destroyed.
    pub fn lookup(&self, id: NodeId) -> Option<Arc<Node>> {
        self.shared.registry.get(id)
    }

    /// Resolve an internal name of the form `"<name>_<id>"`.
    pub fn find_by_internal_name(&self, internal: &str) -> Option<Arc<Node>> {
        let (_, raw) = internal.rsplit_once('_')?;
        let id = raw.parse::<u64>().ok()?;
        self.lookup(NodeId(id))
            .filter(|node| node.internal_name() == internal)
    }

    pub fn is_registered(&self, id: NodeId) -> bool {
        self.shared.registry.contains(id)
    }

    /// Registered nodes, committed or not.
    pub fn registered_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn rooms(&self) -> Vec<Arc<Node>> {
        self.shared.rooms.lock().values().cloned().collect()
    }

    // ========================================================================
    // Deferred notifications
    // ========================================================================

    /// Queue `callback` behind every callback already queued for `node`.
    pub(crate) fn schedule<F>(&self, node: &Arc<Node>, callback: F)
    where
        F: FnOnce(&World) + Send + 'static,
    {
        self.shared.outstanding.begin();
        self.shared.metrics.task_queued();
        let runnable = node.tasks.lock().push(Box::new(callback));
        if runnable {
            self.submit_drain(node);
        }
    }

    fn submit_drain(&self, node: &Arc<Node>) {
        let world = self.clone();
        let target = Arc::clone(node);
        let job = Box::new(move || world.drain_one(&target));
        if let Err(Rejected(job)) = self.shared.dispatcher.enqueue(job) {
            warn!(target: "dispatch", "dispatcher refused work for {}; running inline", node);
            job();
        }
    }

    fn drain_one(&self, node: &Arc<Node>) {
        let next = node.tasks.lock().pop();
        if let Some(callback) = next {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(self)));
            if outcome.is_err() {
                error!(target: "dispatch", "notification for {} panicked", node);
            }
            self.shared.metrics.task_completed(outcome.is_err());
            self.shared.outstanding.end();
        }
        let more = node.tasks.lock().has_more();
        if more {
            self.submit_drain(node);
        }
    }

    /// Block until every queued notification (and anything they queue in
    /// turn) has run.
    pub fn wait_idle(&self) {
        self.shared.outstanding.wait_idle(self.stall());
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`.
    /// True if the world went idle.
    pub fn wait_idle_for(&self, timeout: Duration) -> bool {
        self.shared.outstanding.wait_idle_for(timeout)
    }
}
