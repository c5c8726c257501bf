//! Movement reservations.
//!
//! Moving `M` into `D` takes three steps:
//!
//! 1. Put `M` in its moving phase.
//! 2. Unless `M` already sits directly in `D` (a shift), freeze `D` and each
//!    of its containers up to, but not including, the room. A container's
//!    parent is read only after the container is frozen, so the chain cannot
//!    change under the walk. Meeting `M` on the way means `D` is inside `M`.
//! 3. If a freeze finds a node being moved under an older ticket, release
//!    everything (moving phase included) and wait for that ticket to finish,
//!    then start over with the same ticket. A younger holder is simply waited
//!    for. Tickets only age, so every reservation eventually becomes the
//!    oldest and wins.
//!
//! The reservation is released on drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use super::movelock::Freeze;
use super::node::Node;
use crate::metrics::WorldMetrics;

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Globally ordered claim on a movement. Lower sequence numbers are older.
#[derive(Debug)]
pub(crate) struct Ticket {
    seq: u64,
    finished: Mutex<bool>,
    done: Condvar,
}

impl Ticket {
    pub(crate) fn issue() -> Arc<Ticket> {
        Arc::new(Ticket {
            seq: SEQUENCE.fetch_add(1, Ordering::Relaxed),
            finished: Mutex::new(false),
            done: Condvar::new(),
        })
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn finish(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.done.notify_all();
    }

    fn wait_finished(&self, waiter: u64, stall: Duration) {
        let mut finished = self.finished.lock();
        while !*finished {
            if self.done.wait_for(&mut finished, stall).timed_out() {
                warn!(
                    target: "concurrency",
                    "reservation {} deferring to reservation {} for over {:?}",
                    waiter,
                    self.seq,
                    stall
                );
            }
        }
    }
}

pub(crate) enum Acquired<'w> {
    Held(Reservation<'w>),
    /// The destination is inside the moving node.
    Cycle,
}

enum Walk {
    Clear,
    Cycle,
    Defer(Arc<Ticket>),
}

/// Held locks for one movement: `moving` in its moving phase plus every
/// frozen container of the destination.
pub(crate) struct Reservation<'w> {
    moving: Arc<Node>,
    frozen: Vec<Arc<Node>>,
    ticket: Arc<Ticket>,
    metrics: &'w WorldMetrics,
}

impl<'w> Reservation<'w> {
    pub(crate) fn acquire(
        moving: &Arc<Node>,
        destination: &Arc<Node>,
        metrics: &'w WorldMetrics,
        stall: Duration,
    ) -> Acquired<'w> {
        let ticket = Ticket::issue();
        metrics.reservation_started();

        loop {
            moving.lock.begin_movement(moving.id(), &ticket, stall);
            let mut frozen: Vec<Arc<Node>> = Vec::new();

            let shift = moving
                .container()
                .is_some_and(|c| Arc::ptr_eq(&c, destination));
            let walk = if shift {
                Walk::Clear
            } else {
                Self::freeze_path(moving, destination, &ticket, &mut frozen, stall)
            };

            match walk {
                Walk::Clear => {
                    metrics.reservation_built(true);
                    return Acquired::Held(Reservation {
                        moving: Arc::clone(moving),
                        frozen,
                        ticket,
                        metrics,
                    });
                }
                Walk::Cycle => {
                    release(moving, &mut frozen);
                    ticket.finish();
                    metrics.reservation_built(false);
                    metrics.cycle_refused();
                    debug!(
                        target: "concurrency",
                        "reservation {} refused: {} is inside {}",
                        ticket.seq(),
                        destination,
                        moving
                    );
                    return Acquired::Cycle;
                }
                Walk::Defer(holder) => {
                    release(moving, &mut frozen);
                    metrics.deferral();
                    debug!(
                        target: "concurrency",
                        "reservation {} moving {} defers to reservation {}",
                        ticket.seq(),
                        moving,
                        holder.seq()
                    );
                    holder.wait_finished(ticket.seq(), stall);
                }
            }
        }
    }

    fn freeze_path(
        moving: &Arc<Node>,
        destination: &Arc<Node>,
        ticket: &Ticket,
        frozen: &mut Vec<Arc<Node>>,
        stall: Duration,
    ) -> Walk {
        let mut cursor = Arc::clone(destination);
        loop {
            if cursor.is_room() {
                return Walk::Clear;
            }
            if let Freeze::Defer(holder) = cursor.lock.freeze(cursor.id(), Some(ticket), stall) {
                return Walk::Defer(holder);
            }
            frozen.push(Arc::clone(&cursor));
            match cursor.container() {
                Some(parent) if Arc::ptr_eq(&parent, moving) => return Walk::Cycle,
                Some(parent) => cursor = parent,
                // detached mid-destruction; nothing above it can move
                None => return Walk::Clear,
            }
        }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.ticket.seq()
    }
}

fn release(moving: &Node, frozen: &mut Vec<Arc<Node>>) {
    moving.lock.end_movement(moving.id());
    while let Some(node) = frozen.pop() {
        node.lock.unfreeze(node.id());
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        release(&self.moving, &mut self.frozen);
        self.ticket.finish();
        self.metrics.reservation_ended();
    }
}
