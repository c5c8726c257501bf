//! Tree nodes and their read-side API.
//!
//! A node owns its children strongly (through its content slots) and points
//! at its container weakly. Locks on a node:
//!
//! * `link` (container, relation): leaf lock, never held across another.
//! * `content` (slots, aggregate): may be taken while holding a child's
//!   content lock, never the other way round. `detached` is signalled under
//!   it whenever a child leaves.
//! * `propagation`: flags for collapsing concurrent stat updates.
//! * `admission`: serializes placement decisions into this node.
//! * `tasks`, `watch`: leaf locks for notification bookkeeping.
//!
//! The move-lock is separate and is never waited on while any of the above
//! is held.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};

use super::aggregate::{Aggregate, Tuning};
use super::behavior::Behavior;
use super::dispatch::TaskQueue;
use super::movelock::MoveLock;
use super::stats::{Stats, StatsDelta};
use super::types::{Detail, Lifecycle, LifecycleState, NodeId, Relation, Report};
use super::watch::WatchSets;

pub(crate) struct Link {
    pub(crate) container: Option<Weak<Node>>,
    pub(crate) relation: Relation,
}

/// A child together with the stats its container last counted for it.
pub(crate) struct Slot {
    pub(crate) node: Arc<Node>,
    pub(crate) reported: Stats,
}

pub(crate) struct Contents {
    pub(crate) slots: IndexMap<NodeId, Slot>,
    pub(crate) aggregate: Aggregate,
    pub(crate) peak_count: usize,
}

impl Contents {
    fn new(tuning: &Tuning) -> Self {
        Contents {
            slots: IndexMap::new(),
            aggregate: Aggregate::new(tuning),
            peak_count: 0,
        }
    }

    /// Apply `delta` to the aggregate; slots must already reflect it.
    pub(crate) fn apply(&mut self, delta: &StatsDelta) -> bool {
        let slots = &self.slots;
        self.aggregate.apply(delta, || slots.values().map(|s| &s.reported))
    }
}

#[derive(Default)]
pub(crate) struct Propagation {
    pub(crate) running: bool,
    pub(crate) dirty: bool,
}

pub struct Node {
    id: NodeId,
    name: String,
    internal_name: String,
    behavior: Box<dyn Behavior>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) lock: MoveLock,
    pub(crate) link: Mutex<Link>,
    pub(crate) content: Mutex<Contents>,
    pub(crate) detached: Condvar,
    pub(crate) propagation: Mutex<Propagation>,
    pub(crate) admission: Mutex<()>,
    pub(crate) tasks: Mutex<TaskQueue>,
    pub(crate) watch: Mutex<WatchSets>,
}

impl Node {
    pub(crate) fn new(name: &str, behavior: Box<dyn Behavior>, tuning: &Tuning) -> Self {
        let id = NodeId::next();
        let live = behavior.is_room();
        Node {
            id,
            name: name.to_string(),
            internal_name: format!("{}_{}", name, id.0),
            behavior,
            lifecycle: Lifecycle::new(live),
            lock: MoveLock::new(),
            link: Mutex::new(Link {
                container: None,
                relation: Relation::inside(),
            }),
            content: Mutex::new(Contents::new(tuning)),
            detached: Condvar::new(),
            propagation: Mutex::new(Propagation::default()),
            admission: Mutex::new(()),
            tasks: Mutex::new(TaskQueue::default()),
            watch: Mutex::new(WatchSets::default()),
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"<name>_<id>"`, unique for the life of the process.
    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    pub fn describe(&self, detail: Detail) -> String {
        self.behavior.describe(&self.name, detail)
    }

    pub fn behavior(&self) -> &dyn Behavior {
        &*self.behavior
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    pub fn is_live(&self) -> bool {
        self.lifecycle.get() == LifecycleState::Live
    }

    pub fn is_doomed(&self) -> bool {
        self.lifecycle.get() == LifecycleState::Doomed
    }

    pub fn is_room(&self) -> bool {
        self.behavior.is_room()
    }

    pub fn movable(&self) -> bool {
        !self.is_room() && self.behavior.movable()
    }

    // ========================================================================
    // Placement
    // ========================================================================

    pub fn container(&self) -> Option<Arc<Node>> {
        self.link.lock().container.as_ref().and_then(Weak::upgrade)
    }

    pub fn relation(&self) -> Relation {
        self.link.lock().relation.clone()
    }

    /// The room this node ultimately sits in.
    pub fn room(self: &Arc<Self>) -> Option<Arc<Node>> {
        let mut cursor = Arc::clone(self);
        loop {
            if cursor.is_room() {
                return Some(cursor);
            }
            cursor = cursor.container()?;
        }
    }

    /// True if this node sits directly in a room. False for rooms.
    pub fn is_directly_in_room(&self) -> bool {
        self.container().is_some_and(|c| c.is_room())
    }

    /// True if `obj` sits directly in this node.
    pub fn contains(&self, obj: &Node) -> bool {
        obj.container().is_some_and(|c| c.id == self.id)
    }

    /// True if `obj` sits anywhere below this node. False for itself.
    pub fn contains_deep(&self, obj: &Node) -> bool {
        let mut cursor = obj.container();
        while let Some(c) = cursor {
            if c.id == self.id {
                return true;
            }
            cursor = c.container();
        }
        false
    }

    /// Innermost node containing both; when one contains the other, the
    /// outer of the two.
    pub fn common_container(self: &Arc<Self>, other: &Arc<Node>) -> Option<Arc<Node>> {
        let mut cursor = Some(Arc::clone(self));
        while let Some(c) = cursor {
            if c.id == other.id || c.contains_deep(other) {
                return Some(c);
            }
            cursor = c.container();
        }
        None
    }

    // ========================================================================
    // Contents
    // ========================================================================

    pub fn contents(&self) -> Vec<Arc<Node>> {
        self.content
            .lock()
            .slots
            .values()
            .map(|s| Arc::clone(&s.node))
            .collect()
    }

    pub fn content_count(&self) -> usize {
        self.content.lock().slots.len()
    }

    pub fn content_count_deep(&self) -> usize {
        self.contents()
            .iter()
            .map(|c| 1 + c.content_count_deep())
            .sum()
    }

    /// Aggregate over direct contents: size and weight summed, length and
    /// width maximal.
    pub fn content_stats(&self) -> Stats {
        self.content.lock().aggregate.totals()
    }

    pub fn content_size(&self) -> f64 {
        self.content_stats().size
    }

    pub fn content_weight(&self) -> f64 {
        self.content_stats().weight
    }

    pub fn longest_content(&self) -> f64 {
        self.content_stats().length
    }

    pub fn widest_content(&self) -> f64 {
        self.content_stats().width
    }

    /// Full sum recomputes performed by this node's aggregate so far.
    pub fn full_recomputes(&self) -> u64 {
        self.content.lock().aggregate.full_recomputes()
    }

    // ========================================================================
    // Measurements
    // ========================================================================

    /// Current intrinsic stats, computed from the variant and the contents.
    pub fn measure(&self) -> Stats {
        let contents = self.content_stats();
        self.measure_with(&contents)
    }

    pub(crate) fn measure_with(&self, contents: &Stats) -> Stats {
        let b = &self.behavior;
        Stats::new(
            b.size(contents),
            b.weight(contents),
            b.length(),
            b.width(contents),
        )
    }

    /// Stats as last counted by the container's aggregate. Rooms and detached
    /// nodes report their current measurement.
    pub fn stats(&self) -> Stats {
        if let Some(container) = self.container() {
            if let Some(slot) = container.content.lock().slots.get(&self.id) {
                return slot.reported;
            }
        }
        self.measure()
    }

    pub fn size(&self) -> f64 {
        self.behavior.size(&self.content_stats())
    }

    pub fn weight(&self) -> f64 {
        self.behavior.weight(&self.content_stats())
    }

    pub fn length(&self) -> f64 {
        self.behavior.length()
    }

    pub fn width(&self) -> f64 {
        self.behavior.width(&self.content_stats())
    }

    pub fn length_limit(&self) -> f64 {
        self.behavior.length_limit()
    }

    pub fn width_limit(&self) -> f64 {
        self.behavior.width_limit()
    }

    pub fn available_size(&self) -> f64 {
        self.behavior.available_size(&self.content_stats())
    }

    /// Checks `obj` against this node's width, length and free space,
    /// reporting the first bound it breaks. An object already inside this
    /// node is credited with its own size.
    pub fn can_fit(&self, obj: &Node, report: &mut dyn Report) -> bool {
        let stats = obj.measure();
        if stats.width > self.width_limit() {
            report.report(&format!("The {} is too wide.", obj.name()));
            return false;
        }
        if stats.length > self.length_limit() {
            report.report(&format!("The {} is too long.", obj.name()));
            return false;
        }
        if stats.size > self.space_for(obj) {
            report.report(&format!("The {} is too large.", obj.name()));
            return false;
        }
        true
    }

    /// `can_fit` without report text.
    pub fn fits(&self, obj: &Node) -> bool {
        let stats = obj.measure();
        stats.width <= self.width_limit()
            && stats.length <= self.length_limit()
            && stats.size <= self.space_for(obj)
    }

    fn space_for(&self, obj: &Node) -> f64 {
        let (contents, own) = {
            let content = self.content.lock();
            let own = content.slots.get(&obj.id).map_or(0.0, |s| s.reported.size);
            (content.aggregate.totals(), own)
        };
        self.behavior.available_size(&contents) + own
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.internal_name)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lifecycle", &self.lifecycle.get())
            .finish()
    }
}
