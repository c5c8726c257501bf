//! Watchers: non-owning observation links between nodes.
//!
//! Watching is recorded on both sides, `watchers` on the observed node and
//! `watching` on the observer, and the two are always changed together.
//! When both sides must be locked, the lower id is locked first. Teardown
//! takes one side at a time.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use log::debug;

use super::errors::WorldError;
use super::node::Node;
use super::types::{Actor, LifecycleState, NodeId};
use super::World;

#[derive(Default)]
pub(crate) struct WatchSets {
    watchers: IndexMap<NodeId, Weak<Node>>,
    watching: IndexMap<NodeId, Weak<Node>>,
}

/// What a watcher is told: `actor` did `verb` to `target`, optionally by way
/// of `indirect`.
#[derive(Clone, Debug)]
pub struct Sighting {
    pub actor: Actor,
    pub verb: String,
    pub target: Arc<Node>,
    pub indirect: Option<Arc<Node>>,
}

fn upgrade_all(map: &IndexMap<NodeId, Weak<Node>>) -> Vec<Arc<Node>> {
    map.values().filter_map(Weak::upgrade).collect()
}

fn require_live(node: &Node) -> Result<(), WorldError> {
    match node.lifecycle() {
        LifecycleState::Live => Ok(()),
        LifecycleState::Doomed => Err(WorldError::Doomed { node: node.id() }),
        LifecycleState::Uninitialized => Err(WorldError::NotInitialized { node: node.id() }),
    }
}

impl Node {
    /// Nodes currently watching this one.
    pub fn watchers(&self) -> Vec<Arc<Node>> {
        upgrade_all(&self.watch.lock().watchers)
    }

    /// Nodes this one is watching.
    pub fn watching(&self) -> Vec<Arc<Node>> {
        upgrade_all(&self.watch.lock().watching)
    }

    pub fn watcher_count(&self) -> usize {
        self.watch.lock().watchers.len()
    }

    pub fn has_watcher(&self, watcher: &Node) -> bool {
        self.watch.lock().watchers.contains_key(&watcher.id())
    }
}

impl World {
    /// Make `watcher` observe `target`. Ok(false) if it already did, or if
    /// the two are the same node.
    pub fn add_watcher(&self, target: &Arc<Node>, watcher: &Arc<Node>) -> Result<bool, WorldError> {
        require_live(target)?;
        require_live(watcher)?;
        if Arc::ptr_eq(target, watcher) {
            return Ok(false);
        }

        let (first, second) = if target.id() < watcher.id() {
            (target, watcher)
        } else {
            (watcher, target)
        };
        let mut a = first.watch.lock();
        let mut b = second.watch.lock();
        // destruction dooms before it clears; recheck under the locks
        require_live(target)?;
        require_live(watcher)?;
        let (target_sets, watcher_sets) = if Arc::ptr_eq(first, target) {
            (&mut *a, &mut *b)
        } else {
            (&mut *b, &mut *a)
        };

        if target_sets.watchers.contains_key(&watcher.id()) {
            return Ok(false);
        }
        target_sets.watchers.insert(watcher.id(), Arc::downgrade(watcher));
        watcher_sets.watching.insert(target.id(), Arc::downgrade(target));
        debug!("{} now watches {}", watcher, target);
        Ok(true)
    }

    /// True if `watcher` was watching `target`.
    pub fn remove_watcher(&self, target: &Arc<Node>, watcher: &Arc<Node>) -> bool {
        let removed = target.watch.lock().watchers.shift_remove(&watcher.id()).is_some();
        watcher.watch.lock().watching.shift_remove(&target.id());
        removed
    }

    /// Drop every watcher of `node`, on both sides.
    pub(crate) fn clear_watchers(&self, node: &Arc<Node>) {
        let drained = std::mem::take(&mut node.watch.lock().watchers);
        for watcher in drained.values().filter_map(Weak::upgrade) {
            watcher.watch.lock().watching.shift_remove(&node.id());
        }
    }

    /// Stop `node` watching anything.
    pub(crate) fn clear_watching(&self, node: &Arc<Node>) {
        let drained = std::mem::take(&mut node.watch.lock().watching);
        for target in drained.values().filter_map(Weak::upgrade) {
            target.watch.lock().watchers.shift_remove(&node.id());
        }
    }

    /// Queue a `see` callback on every live watcher of `target`.
    pub(crate) fn notify_watchers(
        &self,
        target: &Arc<Node>,
        actor: &Actor,
        verb: &str,
        indirect: Option<&Arc<Node>>,
    ) {
        let watchers = target.watchers();
        if watchers.is_empty() {
            return;
        }
        let sighting = Sighting {
            actor: actor.clone(),
            verb: verb.to_string(),
            target: Arc::clone(target),
            indirect: indirect.cloned(),
        };
        for watcher in watchers.into_iter().filter(|w| !w.is_doomed()) {
            let sighting = sighting.clone();
            let me = Arc::clone(&watcher);
            self.schedule(&watcher, move |world| me.behavior().see(world, &me, &sighting));
        }
    }

    /// Tell `target`'s watchers that `actor` did `verb` to it.
    pub fn announce(
        &self,
        target: &Arc<Node>,
        actor: &Actor,
        verb: &str,
        indirect: Option<&Arc<Node>>,
    ) -> Result<(), WorldError> {
        require_live(target)?;
        self.notify_watchers(target, actor, verb, indirect);
        Ok(())
    }
}
