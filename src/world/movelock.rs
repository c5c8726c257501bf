//! Per-node move-lock.
//!
//! A node is `Free`, `Frozen(n)` (n reentrant holds that pin the node where it
//! is) or `Moving` (one reservation is relocating it). Freezing waits out a
//! movement; beginning a movement waits out every freeze and any other
//! movement. Both condition variables are always broadcast: several
//! reservations may be parked on the same node for different reasons.
//!
//! Waits are sliced by the stall threshold. Each expired slice is logged on
//! the `concurrency` target and the wait resumes.

use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use parking_lot::{Condvar, Mutex};

use super::reservation::Ticket;
use super::types::NodeId;

#[derive(Debug)]
enum Phase {
    Free,
    Frozen(u32),
    Moving { ticket: Arc<Ticket>, depth: u32 },
}

/// Result of a freeze attempt made on behalf of a reservation.
pub(crate) enum Freeze {
    Frozen,
    /// The node is being moved by an older reservation; the caller must
    /// release everything and wait for that ticket.
    Defer(Arc<Ticket>),
}

enum Blocker {
    Frozen,
    Moving(u64),
}

#[derive(Debug)]
pub(crate) struct MoveLock {
    phase: Mutex<Phase>,
    unfrozen: Condvar,
    movement_ends: Condvar,
}

impl MoveLock {
    pub(crate) fn new() -> Self {
        MoveLock {
            phase: Mutex::new(Phase::Free),
            unfrozen: Condvar::new(),
            movement_ends: Condvar::new(),
        }
    }

    /// Pin the node in place. With a ticket, returns `Defer` instead of
    /// waiting when an older ticket is moving the node; without one, always
    /// waits.
    pub(crate) fn freeze(&self, node: NodeId, ticket: Option<&Ticket>, stall: Duration) -> Freeze {
        let mut phase = self.phase.lock();
        loop {
            let holder = match &mut *phase {
                Phase::Free => {
                    *phase = Phase::Frozen(1);
                    return Freeze::Frozen;
                }
                Phase::Frozen(n) => {
                    *n += 1;
                    return Freeze::Frozen;
                }
                Phase::Moving { ticket, .. } => Arc::clone(ticket),
            };
            if let Some(mine) = ticket {
                if holder.seq() < mine.seq() {
                    return Freeze::Defer(holder);
                }
            }
            if self.movement_ends.wait_for(&mut phase, stall).timed_out() {
                warn!(
                    target: "concurrency",
                    "freeze of node {} waiting on reservation {} for over {:?}",
                    node,
                    holder.seq(),
                    stall
                );
            }
        }
    }

    pub(crate) fn unfreeze(&self, node: NodeId) {
        let mut phase = self.phase.lock();
        match &mut *phase {
            Phase::Frozen(1) => {
                *phase = Phase::Free;
                self.unfrozen.notify_all();
            }
            Phase::Frozen(n) => *n -= 1,
            other => {
                error!(target: "concurrency", "unfreeze of node {} in phase {:?}", node, other);
                debug_assert!(false, "unfreeze without a matching freeze");
            }
        }
    }

    /// Enter the moving phase under `ticket`. Reentrant for the same ticket.
    pub(crate) fn begin_movement(&self, node: NodeId, ticket: &Arc<Ticket>, stall: Duration) {
        let mut phase = self.phase.lock();
        loop {
            let blocker = match &mut *phase {
                Phase::Free => {
                    *phase = Phase::Moving {
                        ticket: Arc::clone(ticket),
                        depth: 1,
                    };
                    return;
                }
                Phase::Moving { ticket: held, depth } if Arc::ptr_eq(held, ticket) => {
                    *depth += 1;
                    return;
                }
                Phase::Moving { ticket: held, .. } => Blocker::Moving(held.seq()),
                Phase::Frozen(_) => Blocker::Frozen,
            };
            let timed_out = match blocker {
                Blocker::Frozen => self.unfrozen.wait_for(&mut phase, stall).timed_out(),
                Blocker::Moving(_) => self.movement_ends.wait_for(&mut phase, stall).timed_out(),
            };
            if timed_out {
                match blocker {
                    Blocker::Frozen => warn!(
                        target: "concurrency",
                        "reservation {} waiting for node {} to unfreeze for over {:?}",
                        ticket.seq(),
                        node,
                        stall
                    ),
                    Blocker::Moving(other) => warn!(
                        target: "concurrency",
                        "reservation {} waiting for reservation {} to finish moving node {} for over {:?}",
                        ticket.seq(),
                        other,
                        node,
                        stall
                    ),
                }
            }
        }
    }

    pub(crate) fn end_movement(&self, node: NodeId) {
        let mut phase = self.phase.lock();
        match &mut *phase {
            Phase::Moving { depth, .. } if *depth > 1 => *depth -= 1,
            Phase::Moving { .. } => {
                *phase = Phase::Free;
                self.movement_ends.notify_all();
            }
            other => {
                error!(target: "concurrency", "end of movement for node {} in phase {:?}", node, other);
                debug_assert!(false, "end_movement without a matching begin");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_free(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const STALL: Duration = Duration::from_secs(5);

    #[test]
    fn test_freeze_is_reentrant() {
        let lock = MoveLock::new();
        let id = NodeId(1);
        assert!(matches!(lock.freeze(id, None, STALL), Freeze::Frozen));
        assert!(matches!(lock.freeze(id, None, STALL), Freeze::Frozen));
        lock.unfreeze(id);
        assert!(!lock.is_free());
        lock.unfreeze(id);
        assert!(lock.is_free());
    }

    #[test]
    fn test_movement_is_reentrant_for_its_ticket() {
        let lock = MoveLock::new();
        let id = NodeId(1);
        let t = Ticket::issue();
        lock.begin_movement(id, &t, STALL);
        lock.begin_movement(id, &t, STALL);
        lock.end_movement(id);
        assert!(!lock.is_free());
        lock.end_movement(id);
        assert!(lock.is_free());
    }

    #[test]
    fn test_newer_ticket_defers_to_older_mover() {
        let lock = MoveLock::new();
        let id = NodeId(1);
        let older = Ticket::issue();
        let newer = Ticket::issue();
        lock.begin_movement(id, &older, STALL);
        match lock.freeze(id, Some(&newer), STALL) {
            Freeze::Defer(holder) => assert_eq!(holder.seq(), older.seq()),
            Freeze::Frozen => panic!("newer ticket froze a node an older ticket is moving"),
        }
        lock.end_movement(id);
    }

    #[test]
    fn test_older_ticket_waits_for_newer_mover() {
        let lock = Arc::new(MoveLock::new());
        let id = NodeId(1);
        let older = Ticket::issue();
        let newer = Ticket::issue();
        lock.begin_movement(id, &newer, STALL);

        let (tx, rx) = mpsc::channel();
        let l2 = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let outcome = l2.freeze(id, Some(&older), STALL);
            tx.send(matches!(outcome, Freeze::Frozen)).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        lock.end_movement(id);
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_movement_waits_for_unfreeze() {
        let lock = Arc::new(MoveLock::new());
        let id = NodeId(1);
        lock.freeze(id, None, STALL);

        let (tx, rx) = mpsc::channel();
        let l2 = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let t = Ticket::issue();
            l2.begin_movement(id, &t, STALL);
            tx.send(()).unwrap();
            l2.end_movement(id);
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        lock.unfreeze(id);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }
}
