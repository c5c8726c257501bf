//! Upward stat propagation.
//!
//! After a structural change the affected containers re-measure themselves
//! and report the difference to their own container, one level at a time,
//! until a level's totals stop moving. Each report holds exactly one freeze
//! (the reporting node, so its container cannot change underneath) and then
//! the container's content lock, child before parent.
//!
//! Concurrent requests for the same node collapse: a second caller only
//! marks the node dirty and leaves, and the caller already running re-reads
//! and reports again before it gives up the node.

use std::sync::Arc;

use super::node::Node;
use super::stats::StatsDelta;
use super::World;

impl World {
    /// Propagate `node`'s current measurement toward the root. Must not be
    /// called while a reservation is held.
    pub(crate) fn update_stats(&self, node: &Arc<Node>) {
        let mut cursor = Arc::clone(node);
        loop {
            {
                let mut flags = cursor.propagation.lock();
                if flags.running {
                    flags.dirty = true;
                    self.shared.metrics.propagation_collapsed();
                    return;
                }
                flags.running = true;
            }

            let mut parents: Vec<Arc<Node>> = Vec::new();
            loop {
                cursor.propagation.lock().dirty = false;
                if let Some(parent) = self.report_to_container(&cursor) {
                    if !parents.iter().any(|p| Arc::ptr_eq(p, &parent)) {
                        parents.push(parent);
                    }
                }
                let mut flags = cursor.propagation.lock();
                if !flags.dirty {
                    flags.running = false;
                    break;
                }
            }

            // the node may have moved between passes; every container whose
            // totals moved needs its own walk
            let Some(next) = parents.pop() else {
                return;
            };
            for other in parents {
                self.update_stats(&other);
            }
            cursor = next;
        }
    }

    /// Report `node` to its container. Returns the container if its totals
    /// changed as a result.
    fn report_to_container(&self, node: &Arc<Node>) -> Option<Arc<Node>> {
        node.lock.freeze(node.id(), None, self.stall());
        let changed = Self::report_frozen(node);
        node.lock.unfreeze(node.id());
        changed
    }

    fn report_frozen(node: &Arc<Node>) -> Option<Arc<Node>> {
        let parent = node.container()?;
        let stats = node.measure();
        let mut contents = parent.content.lock();
        let slot = contents.slots.get_mut(&node.id())?;
        let delta = StatsDelta::diff(&slot.reported, &stats);
        if delta.is_empty() {
            return None;
        }
        slot.reported = stats;
        let changed = contents.apply(&delta);
        drop(contents);
        changed.then_some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::content::{Crate, Room};
    use crate::world::{Actor, Behavior, InlineDispatch, NullReport, Relation, Stats, Tuning};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// A sack whose next measurement blocks until released.
    struct Sack {
        armed: Arc<AtomicBool>,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Behavior for Sack {
        fn size(&self, contents: &Stats) -> f64 {
            if self.armed.swap(false, Ordering::SeqCst) {
                let _ = self.entered.lock().send(());
                let _ = self.release.lock().recv_timeout(Duration::from_secs(10));
            }
            0.01 + contents.size
        }

        fn length(&self) -> f64 {
            0.5
        }

        fn length_limit(&self) -> f64 {
            0.5
        }

        fn width_limit(&self) -> f64 {
            0.5
        }

        fn available_size(&self, contents: &Stats) -> f64 {
            1.0 - contents.size
        }
    }

    #[test]
    fn test_concurrent_updates_collapse_into_the_running_one() {
        let w = Arc::new(World::with_dispatcher(Tuning::default(), InlineDispatch));
        let room = w.spawn("hall", Room::unbounded());
        let armed = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sack = Sack {
            armed: Arc::clone(&armed),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let sack = w.create("sack", sack, &room, Relation::IN).unwrap();
        let first = w.create("pebble", Crate::new(0.001, 0.01, 0.05), &room, Relation::IN).unwrap();
        let second = w.create("pebble", Crate::new(0.001, 0.01, 0.05), &room, Relation::IN).unwrap();

        armed.store(true, Ordering::SeqCst);
        let (w1, s1, p1) = (Arc::clone(&w), Arc::clone(&sack), Arc::clone(&first));
        let mover = thread::spawn(move || w1.add(&p1, &s1, Relation::IN, &Actor::System, &mut NullReport).unwrap());
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // the first propagation is parked inside the sack's measurement
        assert!(w.add(&second, &sack, Relation::IN, &Actor::System, &mut NullReport).unwrap());
        assert_eq!(w.metrics().propagations_collapsed, 1);
        assert!((room.content_size() - 0.01).abs() < 1e-12);

        release_tx.send(()).unwrap();
        assert!(mover.join().unwrap());
        assert_eq!(sack.content_count(), 2);
        assert!((room.content_size() - 0.012).abs() < 1e-12);
        assert!((sack.stats().size - 0.012).abs() < 1e-12);
        assert!(w.audit().is_clean());
    }
}
