//! Dimensional statistics.
//!
//! `size` and `weight` aggregate as sums. `length` and `width` aggregate as
//! maxima, which cannot be undone by subtraction; their deltas therefore carry
//! a [`SpanSignal`] instead of a difference.

use std::ops::Add;

use serde::Serialize;

/// Four-tuple of physical measurements (cubic meters, kilograms, meters).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub size: f64,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
}

impl Stats {
    pub const ZERO: Stats = Stats {
        size: 0.0,
        weight: 0.0,
        length: 0.0,
        width: 0.0,
    };

    pub fn new(size: f64, weight: f64, length: f64, width: f64) -> Self {
        Stats {
            size,
            weight,
            length,
            width,
        }
    }

    /// Delta that removes these stats from an aggregate.
    pub fn negate(&self) -> StatsDelta {
        StatsDelta::removal(self)
    }
}

/// Sums size and weight, keeps the larger span of each kind.
impl Add for Stats {
    type Output = Stats;

    fn add(self, other: Stats) -> Stats {
        Stats {
            size: self.size + other.size,
            weight: self.weight + other.weight,
            length: self.length.max(other.length),
            width: self.width.max(other.width),
        }
    }
}

/// Change to a max-type dimension.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SpanSignal {
    #[default]
    Unchanged,
    /// A new candidate maximum appeared.
    Grew(f64),
    /// A member that measured this much got smaller or left; if it was the
    /// maximum, the maximum must be re-derived.
    Shrank(f64),
}

impl SpanSignal {
    fn between(old: f64, new: f64) -> Self {
        if new > old {
            SpanSignal::Grew(new)
        } else if new < old {
            SpanSignal::Shrank(old)
        } else {
            SpanSignal::Unchanged
        }
    }
}

/// Change applied to an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsDelta {
    pub size: f64,
    pub weight: f64,
    pub length: SpanSignal,
    pub width: SpanSignal,
}

impl StatsDelta {
    /// Delta for a member joining an aggregate.
    pub fn addition(stats: &Stats) -> Self {
        Self::diff(&Stats::ZERO, stats)
    }

    /// Delta for a member leaving an aggregate.
    pub fn removal(stats: &Stats) -> Self {
        Self::diff(stats, &Stats::ZERO)
    }

    /// Delta for a member whose stats went from `old` to `new`.
    pub fn diff(old: &Stats, new: &Stats) -> Self {
        StatsDelta {
            size: new.size - old.size,
            weight: new.weight - old.weight,
            length: SpanSignal::between(old.length, new.length),
            width: SpanSignal::between(old.width, new.width),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0.0
            && self.weight == 0.0
            && self.length == SpanSignal::Unchanged
            && self.width == SpanSignal::Unchanged
    }
}

/// Default width for an object of the given size and length: the side of a
/// square cross-section, capped at the length.
pub fn default_width(size: f64, length: f64) -> f64 {
    (size / length).sqrt().min(length)
}
