//! Randomized concurrent mover workload.
//!
//! Builds one unbounded room holding a set of nestable crates and small
//! items, then lets several blocking tasks move random nodes into random
//! destinations (including each other's ancestors) as fast as they can.
//! Afterwards the world is drained and audited.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::StressConfig;
use crate::metrics::Snapshot;
use crate::world::content::{Crate, Room};
use crate::world::{Actor, AuditReport, Node, NullReport, Relation, World, WorldError};

/// Nodes the movers pick from.
#[derive(Clone)]
pub struct Arena {
    pub room: Arc<Node>,
    pub containers: Vec<Arc<Node>>,
    pub items: Vec<Arc<Node>>,
}

impl Arena {
    pub fn build(world: &World, config: &StressConfig) -> Result<Self, WorldError> {
        let room = world.spawn("arena", Room::unbounded());
        let containers = (0..config.containers)
            .map(|i| {
                world.create(
                    &format!("crate{}", i),
                    Crate::holding(1.0, 5.0, 1.0, 10.0),
                    &room,
                    Relation::IN,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let items = (0..config.items)
            .map(|i| {
                let home = if containers.is_empty() {
                    &room
                } else {
                    &containers[i % containers.len()]
                };
                world.create(
                    &format!("item{}", i),
                    Crate::new(0.01, 0.5, 0.2),
                    home,
                    Relation::IN,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arena {
            room,
            containers,
            items,
        })
    }

    pub fn node_count(&self) -> usize {
        1 + self.containers.len() + self.items.len()
    }
}

/// Per-mover outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub attempted: u64,
    pub succeeded: u64,
    pub refused: u64,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.refused += other.refused;
    }
}

/// One mover: `moves` random moves, a tenth of them onto rather than into.
pub fn mover(world: &World, arena: &Arena, seed: u64, moves: usize) -> Result<Tally, WorldError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tally = Tally::default();
    let mut destinations: Vec<&Arc<Node>> = arena.containers.iter().collect();
    destinations.push(&arena.room);

    for _ in 0..moves {
        let obj = if rng.gen_bool(0.3) {
            arena.containers.choose(&mut rng)
        } else {
            arena.items.choose(&mut rng)
        };
        let (Some(obj), Some(dest)) = (obj, destinations.choose(&mut rng)) else {
            break;
        };
        let relation = if !dest.is_room() && rng.gen_ratio(1, 10) {
            Relation::ON
        } else {
            Relation::IN
        };
        tally.attempted += 1;
        if world.add(obj, dest, relation, &Actor::System, &mut NullReport)? {
            tally.succeeded += 1;
        } else {
            tally.refused += 1;
        }
    }
    Ok(tally)
}

#[derive(Debug, Clone, Serialize)]
pub struct StressSummary {
    pub threads: usize,
    pub moves: Tally,
    pub elapsed_ms: u128,
    pub timed_out: bool,
    pub nodes_expected: usize,
    pub metrics: Snapshot,
    pub audit: AuditReport,
}

impl StressSummary {
    pub fn passed(&self) -> bool {
        !self.timed_out
            && self.audit.is_clean()
            && self.audit.nodes_checked == self.nodes_expected
            && self.metrics.reservations_active == 0
            && self.metrics.reservations_building == 0
    }
}

/// Run the workload on tokio blocking tasks and audit the result.
pub async fn run(world: &World, config: &StressConfig) -> Result<StressSummary> {
    let arena = Arena::build(world, config).map_err(|e| anyhow!("Failed to build stress arena: {}", e))?;
    info!(
        "stress: {} movers x {} moves over {} nodes (seed {:#x})",
        config.threads,
        config.moves_per_thread,
        arena.node_count(),
        config.seed
    );

    let started = Instant::now();
    let deadline = Duration::from_secs(config.timeout_seconds.max(1));
    let handles: Vec<_> = (0..config.threads)
        .map(|i| {
            let world = world.clone();
            let arena = arena.clone();
            let seed = config.seed.wrapping_add((i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
            let moves = config.moves_per_thread;
            tokio::task::spawn_blocking(move || mover(&world, &arena, seed, moves))
        })
        .collect();

    let joined = async {
        let mut total = Tally::default();
        for handle in handles {
            let tally = handle
                .await
                .map_err(|e| anyhow!("Mover task failed: {}", e))?
                .map_err(|e| anyhow!("Mover hit an engine fault: {}", e))?;
            total.merge(tally);
        }
        Ok::<_, anyhow::Error>(total)
    };

    let (moves, mut timed_out) = match tokio::time::timeout(deadline, joined).await {
        Ok(total) => (total?, false),
        Err(_) => {
            warn!("stress: movers still running after {:?}", deadline);
            (Tally::default(), true)
        }
    };

    if !timed_out {
        let remaining = deadline.saturating_sub(started.elapsed()).max(Duration::from_millis(1));
        let idle_world = world.clone();
        let idle = tokio::task::spawn_blocking(move || idle_world.wait_idle_for(remaining))
            .await
            .map_err(|e| anyhow!("Idle wait failed: {}", e))?;
        if !idle {
            warn!("stress: notifications still pending after {:?}", deadline);
            timed_out = true;
        }
    }

    let audit = world.audit();
    let summary = StressSummary {
        threads: config.threads,
        moves,
        elapsed_ms: started.elapsed().as_millis(),
        timed_out,
        nodes_expected: arena.node_count(),
        metrics: world.metrics(),
        audit,
    };
    info!(
        "stress: {} of {} moves succeeded in {} ms, {} deferrals, {} violations",
        summary.moves.succeeded,
        summary.moves.attempted,
        summary.elapsed_ms,
        summary.metrics.deferrals,
        summary.audit.violations.len()
    );
    Ok(summary)
}
