//! Whole-world consistency check.
//!
//! Meant for a quiescent world (no movers in flight, notifications
//! drained). Each node's locks are taken one at a time, so running it
//! concurrently with movers is safe but may report transient mismatches.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::node::Node;
use super::stats::Stats;
use super::types::{LifecycleState, NodeId};
use super::World;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub nodes_checked: usize,
    pub rooms: usize,
    pub violations: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

fn close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn stats_close(a: &Stats, b: &Stats) -> bool {
    close(a.size, b.size) && close(a.weight, b.weight) && close(a.length, b.length) && close(a.width, b.width)
}

impl World {
    /// Walk every room and check the tree against itself and the registry.
    pub fn audit(&self) -> AuditReport {
        let mut report = AuditReport::default();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let rooms = self.rooms();
        report.rooms = rooms.len();

        let mut stack: Vec<Arc<Node>> = Vec::new();
        for room in rooms {
            if room.container().is_some() {
                report.violations.push(format!("room {} has a container", room));
            }
            stack.push(room);
        }

        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                report
                    .violations
                    .push(format!("{} reached twice (cycle or shared child)", node));
                continue;
            }
            report.nodes_checked += 1;
            self.audit_node(&node, &mut report, &mut stack);
        }

        for node in self.shared.registry.snapshot() {
            if node.lifecycle() == LifecycleState::Live && !seen.contains(&node.id()) {
                report
                    .violations
                    .push(format!("{} is live but not reachable from any room", node));
            }
        }
        report
    }

    fn audit_node(&self, node: &Arc<Node>, report: &mut AuditReport, stack: &mut Vec<Arc<Node>>) {
        if !node.is_live() {
            report
                .violations
                .push(format!("{} is in the tree but {:?}", node, node.lifecycle()));
        }
        if self.lookup(node.id()).is_none() {
            report.violations.push(format!("{} is not registered", node));
        }

        let (totals, children): (Stats, Vec<(NodeId, Arc<Node>, Stats)>) = {
            let contents = node.content.lock();
            let children = contents
                .slots
                .iter()
                .map(|(id, slot)| (*id, Arc::clone(&slot.node), slot.reported))
                .collect();
            (contents.aggregate.totals(), children)
        };

        let mut brute = Stats::ZERO;
        for (id, child, reported) in children {
            brute = brute + reported;
            if child.id() != id {
                report
                    .violations
                    .push(format!("{} holds {} under key {}", node, child, id));
            }
            match child.container() {
                Some(parent) if Arc::ptr_eq(&parent, node) => {}
                Some(parent) => report
                    .violations
                    .push(format!("{} is held by {} but points at {}", child, node, parent)),
                None => report
                    .violations
                    .push(format!("{} is held by {} but has no container", child, node)),
            }
            let current = child.measure();
            if !stats_close(&reported, &current) {
                report.violations.push(format!(
                    "{} last reported {:?} to {} but measures {:?}",
                    child, reported, node, current
                ));
            }
            stack.push(child);
        }

        if !stats_close(&totals, &brute) {
            report.violations.push(format!(
                "{} aggregate {:?} differs from recomputed {:?}",
                node, totals, brute
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::content::{Crate, Room};
    use crate::world::{Actor, InlineDispatch, NullReport, Relation, Tuning};

    #[test]
    fn test_fresh_world_is_clean() {
        let w = World::with_dispatcher(Tuning::default(), InlineDispatch);
        let room = w.spawn("hall", Room::unbounded());
        let outer = w
            .create("crate", Crate::holding(4.0, 10.0, 2.0, 3.0), &room, Relation::IN)
            .unwrap();
        let inner = w.create("box", Crate::new(1.0, 1.0, 1.0), &room, Relation::IN).unwrap();
        assert!(w.add(&inner, &outer, Relation::IN, &Actor::System, &mut NullReport).unwrap());
        let report = w.audit();
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.rooms, 1);
        assert_eq!(report.nodes_checked, 3);
    }

    #[test]
    fn test_detects_stale_slot() {
        let w = World::with_dispatcher(Tuning::default(), InlineDispatch);
        let room = w.spawn("hall", Room::unbounded());
        let b = w.create("box", Crate::new(1.0, 1.0, 1.0), &room, Relation::IN).unwrap();
        room.content.lock().slots.get_mut(&b.id()).unwrap().reported.size = 7.0;
        let report = w.audit();
        assert!(!report.is_clean());
        assert!(report.violations.iter().any(|v| v.contains("last reported")));
        assert!(report.violations.iter().any(|v| v.contains("differs from recomputed")));
    }
}
