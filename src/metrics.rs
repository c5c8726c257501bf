//! Engine counters.
//! Plain relaxed atomics, read back through [`WorldMetrics::snapshot`]. Every
//! [`World`](crate::world::World) owns one set so that independent worlds
//! (tests run in parallel) never share counts.
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct WorldMetrics {
    reservations_built: AtomicU64,
    reservations_building: AtomicU64,
    reservations_active: AtomicU64,
    deferrals: AtomicU64,
    cycles_refused: AtomicU64,
    moves: AtomicU64,
    shifts: AtomicU64,
    destructions: AtomicU64,
    propagations_collapsed: AtomicU64,
    tasks_queued: AtomicU64,
    tasks_completed: AtomicU64,
    task_panics: AtomicU64,
}

impl WorldMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reservation_started(&self) {
        self.reservations_built.fetch_add(1, Ordering::Relaxed);
        self.reservations_building.fetch_add(1, Ordering::Relaxed);
    }

    /// The reservation stopped building; `held` if it now holds its locks.
    pub(crate) fn reservation_built(&self, held: bool) {
        self.reservations_building.fetch_sub(1, Ordering::Relaxed);
        if held {
            self.reservations_active.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn reservation_ended(&self) {
        self.reservations_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A reservation released its locks to wait for an older one.
    pub(crate) fn deferral(&self) {
        self.deferrals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cycle_refused(&self) {
        self.cycles_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn moved(&self) {
        self.moves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn shifted(&self) {
        self.shifts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn destroyed(&self) {
        self.destructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn propagation_collapsed(&self) {
        self.propagations_collapsed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_queued(&self) {
        self.tasks_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_completed(&self, panicked: bool) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.task_panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            reservations_built: self.reservations_built.load(Ordering::Relaxed),
            reservations_building: self.reservations_building.load(Ordering::Relaxed),
            reservations_active: self.reservations_active.load(Ordering::Relaxed),
            deferrals: self.deferrals.load(Ordering::Relaxed),
            cycles_refused: self.cycles_refused.load(Ordering::Relaxed),
            moves: self.moves.load(Ordering::Relaxed),
            shifts: self.shifts.load(Ordering::Relaxed),
            destructions: self.destructions.load(Ordering::Relaxed),
            propagations_collapsed: self.propagations_collapsed.load(Ordering::Relaxed),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            task_panics: self.task_panics.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub reservations_built: u64,
    pub reservations_building: u64,
    pub reservations_active: u64,
    pub deferrals: u64,
    pub cycles_refused: u64,
    pub moves: u64,
    pub shifts: u64,
    pub destructions: u64,
    pub propagations_collapsed: u64,
    pub tasks_queued: u64,
    pub tasks_completed: u64,
    pub task_panics: u64,
}

impl Snapshot {
    /// Notification tasks queued but not yet run.
    pub fn tasks_pending(&self) -> u64 {
        self.tasks_queued.saturating_sub(self.tasks_completed)
    }
}
