//! Structural operations: placement, movement, removal and destruction.
//!
//! Every structural change runs under a [`Reservation`](super::reservation)
//! and, for the decision itself, under the destination's admission lock, so
//! that a capacity check and the insertion it allows cannot be split by a
//! competing insertion. Notifications are queued only after every lock is
//! released.

use std::sync::Arc;

use log::{debug, info, warn};

use super::behavior::Behavior;
use super::errors::WorldError;
use super::node::{Node, Slot};
use super::reservation::{Acquired, Reservation, Ticket};
use super::stats::StatsDelta;
use super::types::{Actor, LifecycleState, Relation, Report, TextReport};
use super::World;

fn require_unplaced(node: &Node) -> Result<(), WorldError> {
    match node.lifecycle() {
        LifecycleState::Uninitialized => Ok(()),
        LifecycleState::Live => Err(WorldError::AlreadyInitialized { node: node.id() }),
        LifecycleState::Doomed => Err(WorldError::Doomed { node: node.id() }),
    }
}

/// Slot maps that grew past this are shrunk once mostly empty.
const SHRINK_PEAK: usize = 192;
const SHRINK_TO: usize = 64;

impl World {
    // ========================================================================
    // Creation
    // ========================================================================

    /// Build and register a node. Rooms are live at once; anything else
    /// waits for [`commit`](Self::commit).
    pub fn spawn<B: Behavior>(&self, name: &str, behavior: B) -> Arc<Node> {
        let node = Arc::new(Node::new(name, Box::new(behavior), &self.shared.tuning));
        self.shared.registry.insert(&node);
        if node.is_room() {
            self.shared.rooms.lock().insert(node.id(), Arc::clone(&node));
            info!(target: "creation", "created room {}", node);
        } else {
            debug!(target: "creation", "spawned {}", node);
        }
        node
    }

    /// First placement of a spawned node. If `container` refuses it the node
    /// is discarded and Ok(false) is returned with the reason in `report`.
    pub fn commit(
        &self,
        node: &Arc<Node>,
        container: &Arc<Node>,
        relation: impl Into<Relation>,
        report: &mut dyn Report,
    ) -> Result<bool, WorldError> {
        if node.is_room() {
            return Err(WorldError::AlreadyInitialized { node: node.id() });
        }
        require_unplaced(node)?;
        if !container.is_live() {
            return Err(WorldError::NotLive { node: container.id() });
        }
        let relation = relation.into();

        let reservation =
            match Reservation::acquire(node, container, &self.shared.metrics, self.stall()) {
                Acquired::Held(reservation) => reservation,
                Acquired::Cycle => {
                    // only a placed node can hold the container
                    require_unplaced(node)?;
                    report.report("You cannot put something inside itself.");
                    self.discard(node);
                    return Ok(false);
                }
            };
        // a competing commit of the same node may have finished while this
        // one waited for the reservation
        require_unplaced(node)?;

        let admission = container.admission.lock();
        let admitted = if container.is_doomed() {
            report.report(&format!("The {} no longer exists.", container.name()));
            false
        } else {
            container
                .behavior()
                .authorize_add(container, node, &relation, &Actor::System, report)
        };
        let changed = admitted && self.enact_add(container, node, &relation);
        drop(admission);
        if !admitted {
            self.discard(node);
            return Ok(false);
        }
        drop(reservation);

        if changed {
            self.update_stats(container);
        }
        info!(target: "creation", "placed {} '{}' {}", node, relation, container);
        Ok(true)
    }

    /// Spawn and commit in one step.
    pub fn create<B: Behavior>(
        &self,
        name: &str,
        behavior: B,
        container: &Arc<Node>,
        relation: impl Into<Relation>,
    ) -> Result<Arc<Node>, WorldError> {
        let node = self.spawn(name, behavior);
        let mut reasons = TextReport::new();
        if self.commit(&node, container, relation, &mut reasons)? {
            Ok(node)
        } else {
            Err(WorldError::DoesNotFit {
                node: node.id(),
                reason: reasons.text().to_string(),
            })
        }
    }

    fn discard(&self, node: &Arc<Node>) {
        node.lifecycle.discard();
        self.shared.registry.remove(node.id());
        info!(target: "creation", "discarded {}: initial placement refused", node);
    }

    // ========================================================================
    // Movement
    // ========================================================================

    /// Move `obj` into `dest` under `relation`. Ok(false) with a reason in
    /// `report` when the move is refused.
    pub fn add(
        &self,
        obj: &Arc<Node>,
        dest: &Arc<Node>,
        relation: impl Into<Relation>,
        actor: &Actor,
        report: &mut dyn Report,
    ) -> Result<bool, WorldError> {
        if obj.lifecycle() == LifecycleState::Uninitialized {
            return Err(WorldError::NotInitialized { node: obj.id() });
        }
        if dest.lifecycle() == LifecycleState::Uninitialized {
            return Err(WorldError::NotLive { node: dest.id() });
        }
        if obj.is_room() {
            return Err(WorldError::RoomCannotMove { node: obj.id() });
        }
        if obj.is_doomed() {
            report.report(&format!("The {} no longer exists.", obj.name()));
            return Ok(false);
        }
        if dest.is_doomed() {
            report.report(&format!("The {} no longer exists.", dest.name()));
            return Ok(false);
        }
        if Arc::ptr_eq(obj, dest) {
            report.report("You cannot put something inside itself.");
            return Ok(false);
        }
        let relation = relation.into();

        let reservation = match Reservation::acquire(obj, dest, &self.shared.metrics, self.stall()) {
            Acquired::Held(reservation) => reservation,
            Acquired::Cycle => {
                report.report("You cannot put something inside itself.");
                return Ok(false);
            }
        };
        let seq = reservation.seq();

        let source = match obj.container() {
            Some(source) if !obj.is_doomed() => source,
            _ => {
                report.report(&format!("The {} no longer exists.", obj.name()));
                return Ok(false);
            }
        };

        if Arc::ptr_eq(&source, dest) {
            if obj.relation() == relation {
                report.report(&format!("The {} is already there.", obj.name()));
                return Ok(false);
            }
            if !obj.movable() {
                report.report(&format!("The {} is unmovable.", obj.name()));
                return Ok(false);
            }
            let admission = dest.admission.lock();
            if dest.is_doomed() {
                report.report(&format!("The {} no longer exists.", dest.name()));
                return Ok(false);
            }
            if !dest.behavior().authorize_remove(dest, obj, dest, actor, report)
                || !dest.behavior().authorize_add(dest, obj, &relation, actor, report)
            {
                return Ok(false);
            }
            let old = self.enact_shift(obj, &relation);
            drop(admission);
            drop(reservation);

            self.shared.metrics.shifted();
            debug!(
                target: "movement",
                "reservation {} shifted {} from '{}' to '{}' {}",
                seq,
                obj,
                old,
                relation,
                dest
            );
            self.notify_shift(dest, obj, actor, old);
            return Ok(true);
        }

        if !obj.movable() {
            report.report(&format!("The {} is unmovable.", obj.name()));
            return Ok(false);
        }

        let admission = dest.admission.lock();
        if dest.is_doomed() {
            report.report(&format!("The {} no longer exists.", dest.name()));
            return Ok(false);
        }
        if !source.behavior().authorize_remove(&source, obj, dest, actor, report) {
            return Ok(false);
        }
        if !dest.behavior().authorize_add(dest, obj, &relation, actor, report) {
            return Ok(false);
        }
        let Some(source_changed) = self.enact_remove(&source, obj, false) else {
            report.report(&format!("The {} can't leave the {}.", obj.name(), source.name()));
            return Ok(false);
        };
        let dest_changed = self.enact_add(dest, obj, &relation);
        drop(admission);
        drop(reservation);

        if source_changed {
            self.update_stats(&source);
        }
        if dest_changed {
            self.update_stats(dest);
        }
        self.shared.metrics.moved();
        debug!(
            target: "movement",
            "reservation {} moved {} from {} to '{}' {}",
            seq,
            obj,
            source,
            relation,
            dest
        );
        self.notify_move(&source, dest, obj, actor);
        Ok(true)
    }

    /// Take `obj` out of its container. Objects directly in a room have
    /// nowhere to go and are destroyed; anything else falls up one level,
    /// keeping the relation its old container had.
    pub fn remove(&self, obj: &Arc<Node>, actor: &Actor, report: &mut dyn Report) -> Result<bool, WorldError> {
        match obj.lifecycle() {
            LifecycleState::Uninitialized => return Err(WorldError::NotInitialized { node: obj.id() }),
            LifecycleState::Doomed => {
                report.report(&format!("The {} no longer exists.", obj.name()));
                return Ok(false);
            }
            LifecycleState::Live => {}
        }
        if obj.is_room() {
            return Err(WorldError::RoomCannotMove { node: obj.id() });
        }
        let Some(container) = obj.container() else {
            report.report(&format!("The {} is not anywhere.", obj.name()));
            return Ok(false);
        };
        if container.is_room() {
            return self.destroy(obj, actor);
        }
        let Some(outer) = container.container() else {
            report.report(&format!("The {} can't leave the {}.", obj.name(), container.name()));
            return Ok(false);
        };
        self.add(obj, &outer, container.relation(), actor, report)
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Destroy `node` and everything under it. Ok(false) if it was already
    /// being destroyed.
    pub fn destroy(&self, node: &Arc<Node>, actor: &Actor) -> Result<bool, WorldError> {
        match node.lifecycle() {
            LifecycleState::Uninitialized => Err(WorldError::NotInitialized { node: node.id() }),
            LifecycleState::Doomed => Ok(false),
            LifecycleState::Live => {
                if !Self::doom(node) {
                    return Ok(false);
                }
                self.destroy_doomed(node, actor);
                Ok(true)
            }
        }
    }

    /// Live -> Doomed. Once this returns true, nothing can enter `node` or
    /// leave it except by destruction.
    fn doom(node: &Arc<Node>) -> bool {
        {
            let _contents = node.content.lock();
            if !node.lifecycle.doom() {
                return false;
            }
        }
        // wait out any placement decided before the flag was set
        drop(node.admission.lock());
        true
    }

    fn destroy_doomed(&self, node: &Arc<Node>, actor: &Actor) {
        loop {
            let last = node
                .content
                .lock()
                .slots
                .last()
                .map(|(_, slot)| Arc::clone(&slot.node));
            let Some(child) = last else {
                break;
            };
            if Self::doom(&child) {
                self.destroy_doomed(&child, actor);
            } else {
                // another destroyer owns it and will take it out
                self.wait_detached(node, &child);
            }
        }

        let ticket = Ticket::issue();
        node.lock.begin_movement(node.id(), &ticket, self.stall());
        let parent = node.container();
        let changed = parent
            .as_ref()
            .and_then(|p| self.enact_remove(p, node, true))
            .unwrap_or(false);
        node.link.lock().container = None;
        node.lock.end_movement(node.id());
        ticket.finish();

        if changed {
            if let Some(parent) = &parent {
                self.update_stats(parent);
            }
        }
        self.shared.registry.remove(node.id());
        if node.is_room() {
            self.shared.rooms.lock().shift_remove(&node.id());
        }

        if let Some(parent) = parent {
            let (me, obj, actor) = (Arc::clone(&parent), Arc::clone(node), actor.clone());
            self.schedule(&parent, move |world| {
                me.behavior().on_remove(world, &me, &obj, None, &actor)
            });
        }
        self.notify_watchers(node, actor, "destroy", None);
        self.clear_watchers(node);
        self.clear_watching(node);
        let (me, by) = (Arc::clone(node), actor.clone());
        self.schedule(node, move |world| me.behavior().on_destroyed(world, &me, &by));

        self.shared.metrics.destroyed();
        info!(target: "destruction", "{} destroyed by {}", node, actor);
    }

    fn wait_detached(&self, node: &Arc<Node>, child: &Arc<Node>) {
        let stall = self.stall();
        let mut contents = node.content.lock();
        while contents.slots.contains_key(&child.id()) {
            if node.detached.wait_for(&mut contents, stall).timed_out() {
                warn!(
                    target: "concurrency",
                    "destruction of {} waiting for {} to be taken out for over {:?}",
                    node,
                    child,
                    stall
                );
            }
        }
    }

    // ========================================================================
    // Enactment (callers hold the reservation and admission lock)
    // ========================================================================

    /// Returns true if `dest`'s content totals changed.
    fn enact_add(&self, dest: &Arc<Node>, obj: &Arc<Node>, relation: &Relation) -> bool {
        let stats = obj.measure();
        let mut contents = dest.content.lock();
        {
            let mut link = obj.link.lock();
            link.container = Some(Arc::downgrade(dest));
            link.relation = relation.clone();
        }
        obj.lifecycle.activate();
        contents.slots.insert(
            obj.id(),
            Slot {
                node: Arc::clone(obj),
                reported: stats,
            },
        );
        contents.peak_count = contents.peak_count.max(contents.slots.len());
        contents.apply(&StatsDelta::addition(&stats))
    }

    /// None if `source` is doomed and `allow_doomed` is not set; otherwise
    /// whether `source`'s content totals changed. The object's container
    /// link is left for the caller to overwrite.
    fn enact_remove(&self, source: &Arc<Node>, obj: &Arc<Node>, allow_doomed: bool) -> Option<bool> {
        let mut contents = source.content.lock();
        if source.is_doomed() && !allow_doomed {
            return None;
        }
        let Some(slot) = contents.slots.shift_remove(&obj.id()) else {
            return Some(false);
        };
        source.detached.notify_all();
        if contents.peak_count > SHRINK_PEAK && contents.slots.len() <= contents.peak_count >> 4 {
            contents.slots.shrink_to(SHRINK_TO);
            contents.peak_count = contents.slots.len();
        }
        Some(contents.apply(&StatsDelta::removal(&slot.reported)))
    }

    /// Change only the relation. Returns the previous one.
    fn enact_shift(&self, obj: &Arc<Node>, relation: &Relation) -> Relation {
        std::mem::replace(&mut obj.link.lock().relation, relation.clone())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn notify_move(&self, source: &Arc<Node>, dest: &Arc<Node>, obj: &Arc<Node>, actor: &Actor) {
        {
            let (me, obj, to, actor) = (Arc::clone(source), Arc::clone(obj), Arc::clone(dest), actor.clone());
            self.schedule(source, move |world| {
                me.behavior().on_remove(world, &me, &obj, Some(&to), &actor)
            });
        }
        {
            let (me, obj, actor) = (Arc::clone(dest), Arc::clone(obj), actor.clone());
            self.schedule(dest, move |world| me.behavior().on_add(world, &me, &obj, &actor));
        }
        let (me, actor) = (Arc::clone(obj), actor.clone());
        self.schedule(obj, move |world| {
            me.behavior().on_moved(world, &me, &actor);
            world.notify_watchers(&me, &actor, "move", None);
        });
    }

    fn notify_shift(&self, dest: &Arc<Node>, obj: &Arc<Node>, actor: &Actor, old: Relation) {
        {
            let (me, obj, actor, old) = (Arc::clone(dest), Arc::clone(obj), actor.clone(), old.clone());
            self.schedule(dest, move |world| {
                me.behavior().on_shift(world, &me, &obj, &actor, &old)
            });
        }
        let (me, actor) = (Arc::clone(obj), actor.clone());
        self.schedule(obj, move |world| {
            me.behavior().on_shifted(world, &me, &actor, &old);
            world.notify_watchers(&me, &actor, "shift", None);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::content::{Crate, Room};
    use crate::world::movelock::Freeze;
    use crate::world::{InlineDispatch, NullReport, Tuning};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn world() -> World {
        World::with_dispatcher(Tuning::default(), InlineDispatch)
    }

    #[test]
    fn test_commit_places_and_activates() {
        let w = world();
        let room = w.spawn("hall", Room::new(100.0, 10.0, 10.0));
        let b = w.spawn("box", Crate::new(2.0, 1.0, 1.5));
        assert_eq!(b.lifecycle(), LifecycleState::Uninitialized);
        assert!(w.commit(&b, &room, Relation::IN, &mut NullReport).unwrap());
        assert!(b.is_live());
        assert!(room.contains(&b));
        assert_eq!(room.content_size(), 2.0);
        assert_eq!(
            w.commit(&b, &room, Relation::IN, &mut NullReport),
            Err(WorldError::AlreadyInitialized { node: b.id() })
        );
    }

    #[test]
    fn test_refused_commit_discards() {
        let w = world();
        let room = w.spawn("closet", Room::new(1.0, 10.0, 10.0));
        let b = w.spawn("box", Crate::new(2.0, 1.0, 1.5));
        let mut report = TextReport::new();
        assert!(!w.commit(&b, &room, Relation::IN, &mut report).unwrap());
        assert_eq!(report.text(), "The box is too large.");
        assert!(b.is_doomed());
        assert!(!w.is_registered(b.id()));
        assert_eq!(room.content_count(), 0);
    }

    #[test]
    fn test_create_reports_refusal_reason() {
        let w = world();
        let room = w.spawn("closet", Room::new(100.0, 1.0, 10.0));
        match w.create("pole", Crate::new(1.0, 0.5, 3.0), &room, Relation::IN) {
            Err(WorldError::DoesNotFit { reason, .. }) => assert_eq!(reason, "The pole is too long."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_add_requires_committed_nodes() {
        let w = world();
        let room = w.spawn("hall", Room::unbounded());
        let loose = w.spawn("box", Crate::new(1.0, 1.0, 1.0));
        assert_eq!(
            w.add(&loose, &room, Relation::IN, &Actor::System, &mut NullReport),
            Err(WorldError::NotInitialized { node: loose.id() })
        );
        let other = w.spawn("annex", Room::unbounded());
        assert_eq!(
            w.add(&other, &room, Relation::IN, &Actor::System, &mut NullReport),
            Err(WorldError::RoomCannotMove { node: other.id() })
        );
    }

    #[test]
    fn test_enact_remove_shrinks_after_mass_exodus() {
        let w = world();
        let room = w.spawn("warehouse", Room::unbounded());
        let items: Vec<_> = (0..200)
            .map(|i| w.create(&format!("box{}", i), Crate::new(0.1, 1.0, 0.1), &room, Relation::IN).unwrap())
            .collect();
        assert_eq!(room.content.lock().peak_count, 200);
        for item in &items[..190] {
            assert!(w.destroy(item, &Actor::System).unwrap());
        }
        let contents = room.content.lock();
        assert_eq!(contents.slots.len(), 10);
        // shrunk once, when 12 were left
        assert_eq!(contents.peak_count, 12);
    }

    #[test]
    fn test_doomed_container_refuses_departures() {
        let w = world();
        let room = w.spawn("hall", Room::unbounded());
        let outer = w.create("crate", Crate::holding(10.0, 5.0, 2.0, 8.0), &room, Relation::IN).unwrap();
        let inner = w.create("box", Crate::new(1.0, 1.0, 1.0), &outer, Relation::IN).unwrap();
        assert!(World::doom(&outer));
        assert_eq!(w.enact_remove(&outer, &inner, false), None);
        assert!(!World::doom(&outer));
    }

    #[test]
    fn test_destroyer_waits_for_a_child_owned_by_another_destroyer() {
        let w = Arc::new(world());
        let room = w.spawn("hall", Room::unbounded());
        let chest = w.create("chest", Crate::holding(10.0, 5.0, 2.0, 8.0), &room, Relation::IN).unwrap();
        let coin = w.create("coin", Crate::new(0.01, 0.1, 0.02), &chest, Relation::IN).unwrap();

        // pin the coin so its own destroyer stalls after dooming it
        assert!(matches!(coin.lock.freeze(coin.id(), None, w.stall()), Freeze::Frozen));
        let (w1, c1) = (Arc::clone(&w), Arc::clone(&coin));
        let first = thread::spawn(move || w1.destroy(&c1, &Actor::System).unwrap());
        let started = std::time::Instant::now();
        while !coin.is_doomed() {
            assert!(started.elapsed() < Duration::from_secs(5), "coin was never doomed");
            thread::sleep(Duration::from_millis(1));
        }

        let (tx, rx) = mpsc::channel();
        let (w2, c2) = (Arc::clone(&w), Arc::clone(&chest));
        let second = thread::spawn(move || {
            let destroyed = w2.destroy(&c2, &Actor::System).unwrap();
            tx.send(()).unwrap();
            destroyed
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(chest.is_doomed());
        assert!(chest.contains(&coin));

        coin.lock.unfreeze(coin.id());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.join().unwrap());
        assert!(second.join().unwrap());
        assert_eq!(chest.content_count(), 0);
        assert_eq!(room.content_count(), 0);
        assert!(!w.is_registered(coin.id()));
        assert!(w.audit().is_clean());
    }
}
