//! # Containment engine
//!
//! A mutable tree of physical objects. Rooms are roots; every other node
//! sits in exactly one container under a relation tag ("in", "on", ...).
//! Each node keeps rolling totals of its direct contents (size and weight
//! summed, length and width maximal) and reports its own measurements to
//! its container whenever they change.
//!
//! Any number of threads may move nodes at once. Structural changes are
//! serialized by per-node move-locks acquired through ticketed
//! reservations (older tickets win), so movers never deadlock and never
//! build a cycle. Behavior hooks run afterwards on a dispatch pool, in
//! order per node.
//!
//! ```rust,no_run
//! use worldtree::world::content::{Crate, Room};
//! use worldtree::world::{Actor, InlineDispatch, NullReport, Tuning, World};
//!
//! # fn main() -> Result<(), worldtree::world::WorldError> {
//! let world = World::with_dispatcher(Tuning::default(), InlineDispatch);
//! let hall = world.spawn("hall", Room::new(100.0, 10.0, 10.0));
//! let chest = world.create("chest", Crate::holding(2.0, 20.0, 1.5, 1.5), &hall, "in")?;
//! let coin = world.create("coin", Crate::new(0.001, 0.01, 0.02), &hall, "in")?;
//! world.add(&coin, &chest, "in", &Actor::System, &mut NullReport)?;
//! assert_eq!(hall.content_count_deep(), 2);
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod audit;
mod behavior;
mod containment;
pub mod content;
mod dispatch;
mod engine;
mod errors;
mod movelock;
mod node;
mod propagation;
mod registry;
mod reservation;
mod stats;
mod types;
mod watch;

pub use aggregate::{Aggregate, Tuning};
pub use audit::AuditReport;
pub use behavior::Behavior;
pub use dispatch::{Dispatch, InlineDispatch, Rejected, Task, WorkerPool};
pub use engine::World;
pub use errors::WorldError;
pub use node::Node;
pub use stats::{default_width, SpanSignal, Stats, StatsDelta};
pub use types::{Actor, Detail, LifecycleState, NodeId, NullReport, Relation, Report, TextReport};
pub use watch::Sighting;
