//! Rolling aggregate of a node's direct contents.
//!
//! Sums (size, weight) are updated incrementally. Each decrease spends one
//! unit of a recompute budget; when the budget is exhausted, or the magnitude
//! drops below `peak * peak_ratio`, the sum is rebuilt from the members to
//! flush accumulated floating-point error.
//!
//! Maxima (length, width) take `Grew` signals directly. A `Shrank` signal for
//! a value at least as large as the current maximum triggers a rescan, which
//! stops early as soon as the old maximum is found again.
//!
//! Callers hold the owning node's content lock, so the member set is stable
//! for the duration of a rescan.

use std::time::Duration;

use super::stats::{SpanSignal, Stats, StatsDelta};

/// Knobs copied into every aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Decreases allowed between forced full recomputes of a sum.
    pub recompute_interval: u32,
    /// A sum below `peak * peak_ratio` is rebuilt from scratch.
    pub peak_ratio: f64,
    /// Blocking waits log a warning after this long.
    pub stall_warning: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            recompute_interval: 1 << 10,
            peak_ratio: 1.0 / (1u64 << 32) as f64,
            stall_warning: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    totals: Stats,
    size_budget: u32,
    size_peak: f64,
    weight_budget: u32,
    weight_peak: f64,
    interval: u32,
    peak_ratio: f64,
    full_recomputes: u64,
}

impl Aggregate {
    pub fn new(tuning: &Tuning) -> Self {
        Aggregate {
            totals: Stats::ZERO,
            size_budget: tuning.recompute_interval,
            size_peak: 0.0,
            weight_budget: tuning.recompute_interval,
            weight_peak: 0.0,
            interval: tuning.recompute_interval,
            peak_ratio: tuning.peak_ratio,
            full_recomputes: 0,
        }
    }

    pub fn totals(&self) -> Stats {
        self.totals
    }

    pub fn full_recomputes(&self) -> u64 {
        self.full_recomputes
    }

    /// Apply `delta`. `members` must yield the stats of the current members,
    /// already reflecting the change. Returns true if any total moved.
    pub fn apply<'a, F, I>(&mut self, delta: &StatsDelta, members: F) -> bool
    where
        F: Fn() -> I,
        I: Iterator<Item = &'a Stats>,
    {
        let mut changed = false;

        if delta.size != 0.0 {
            let old = self.totals.size;
            self.totals.size += delta.size;
            if self.totals.size != old {
                changed = true;
                if delta.size < 0.0 {
                    self.size_budget = self.size_budget.saturating_sub(1);
                    if self.size_budget == 0 || self.totals.size < self.size_peak * self.peak_ratio {
                        self.totals.size = members().map(|s| s.size).sum();
                        self.size_budget = self.interval;
                        self.size_peak = self.totals.size;
                        self.full_recomputes += 1;
                    }
                } else {
                    self.size_peak = self.size_peak.max(self.totals.size);
                }
            }
        }

        // Weight may be negative (balloons); its magnitude is what drifts.
        if delta.weight != 0.0 {
            let old = self.totals.weight;
            self.totals.weight += delta.weight;
            if self.totals.weight != old {
                changed = true;
                if self.totals.weight.abs() < old.abs() {
                    self.weight_budget = self.weight_budget.saturating_sub(1);
                    if self.weight_budget == 0
                        || self.totals.weight.abs() < self.weight_peak * self.peak_ratio
                    {
                        self.totals.weight = members().map(|s| s.weight).sum();
                        self.weight_budget = self.interval;
                        self.weight_peak = self.totals.weight.abs();
                        self.full_recomputes += 1;
                    }
                } else {
                    self.weight_peak = self.weight_peak.max(self.totals.weight.abs());
                }
            }
        }

        if let Some(length) = span(self.totals.length, delta.length, || members().map(|s| s.length)) {
            self.totals.length = length;
            changed = true;
        }
        if let Some(width) = span(self.totals.width, delta.width, || members().map(|s| s.width)) {
            self.totals.width = width;
            changed = true;
        }

        changed
    }
}

/// New maximum after `signal`, or None if it stays put.
fn span<F, I>(current: f64, signal: SpanSignal, values: F) -> Option<f64>
where
    F: Fn() -> I,
    I: Iterator<Item = f64>,
{
    match signal {
        SpanSignal::Grew(v) if v > current => Some(v),
        SpanSignal::Shrank(v) if v >= current => {
            let mut best = 0.0f64;
            for v in values() {
                if v == current {
                    best = v;
                    break;
                }
                best = best.max(v);
            }
            (best != current).then_some(best)
        }
        _ => None,
    }
}
