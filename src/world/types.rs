//! Small value types shared across the world module: identifiers, relation
//! tags, lifecycle flags, description levels, actors and report sinks.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::node::Node;

/// Process-unique node identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    pub(crate) fn next() -> Self {
        NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a node sits in its container ("in", "on", ...). Opaque to the engine
/// apart from equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation(Arc<str>);

impl Relation {
    pub const IN: &'static str = "in";
    pub const ON: &'static str = "on";

    pub fn new(tag: &str) -> Self {
        Relation(Arc::from(tag))
    }

    pub fn inside() -> Self {
        Self::new(Self::IN)
    }

    pub fn on_top() -> Self {
        Self::new(Self::ON)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, tag: &str) -> bool {
        &*self.0 == tag
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Relation {
    fn from(tag: &str) -> Self {
        Relation::new(tag)
    }
}

/// Monotonic node lifecycle: `Uninitialized -> Live -> Doomed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Live,
    Doomed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

const UNINITIALIZED: u8 = 0;
const LIVE: u8 = 1;
const DOOMED: u8 = 2;

impl Lifecycle {
    pub(crate) fn new(live: bool) -> Self {
        Lifecycle(AtomicU8::new(if live { LIVE } else { UNINITIALIZED }))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        match self.0.load(Ordering::Acquire) {
            UNINITIALIZED => LifecycleState::Uninitialized,
            LIVE => LifecycleState::Live,
            _ => LifecycleState::Doomed,
        }
    }

    /// Uninitialized -> Live. False if the node was not waiting for placement.
    pub(crate) fn activate(&self) -> bool {
        self.0
            .compare_exchange(UNINITIALIZED, LIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Live -> Doomed. Only one caller ever wins.
    pub(crate) fn doom(&self) -> bool {
        self.0
            .compare_exchange(LIVE, DOOMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Discard a node whose placement failed.
    pub(crate) fn discard(&self) {
        self.0.store(DOOMED, Ordering::Release);
    }
}

/// Level of detail requested from `describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    Basic,
    Detail,
    Inside,
}

/// Who caused an event. `System` stands in for the world itself (creation,
/// scripted cleanup).
#[derive(Clone)]
pub enum Actor {
    System,
    Node(Arc<Node>),
}

impl Actor {
    pub fn node(&self) -> Option<&Arc<Node>> {
        match self {
            Actor::System => None,
            Actor::Node(node) => Some(node),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("the creator"),
            Actor::Node(node) => write!(f, "{}", node),
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("Actor::System"),
            Actor::Node(node) => write!(f, "Actor::Node({})", node.internal_name()),
        }
    }
}

/// Sink for human-readable outcome text.
pub trait Report {
    fn report(&mut self, text: &str);
}

/// Collects report lines, newline-joined.
#[derive(Debug, Default, Clone)]
pub struct TextReport {
    text: String,
}

impl TextReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Report for TextReport {
    fn report(&mut self, text: &str) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(text);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReport;

impl Report for NullReport {
    fn report(&mut self, _text: &str) {}
}
