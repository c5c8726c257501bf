//! # Worldtree - concurrent containment hierarchy
//!
//! Worldtree keeps a tree of physical objects (rooms, furniture, bags,
//! whatever lives in them) where every node knows the size, weight and
//! longest and widest extents of its contents, and where any number of
//! threads may move objects around the tree at once without corrupting it
//! or deadlocking.
//!
//! ## Features
//!
//! - **Ticketed movement reservations**: per-node move-locks, acquired
//!   oldest-ticket-first, rule out deadlock and cycles without a global lock.
//! - **Rolling aggregates**: incremental sums with periodic full recomputes,
//!   and maxima that rescan only when the largest member leaves.
//! - **Collapsing propagation**: concurrent stat updates for the same node
//!   fold into one upward walk.
//! - **Ordered notifications**: behavior hooks and watcher callbacks run on a
//!   worker pool, in order per node, after every lock is released.
//! - **Auditing**: a full consistency check for quiescent worlds, and a
//!   randomized stress driver built on it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use worldtree::config::Config;
//! use worldtree::world::content::{Refrigerator, Room};
//! use worldtree::world::World;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("config.toml").await?;
//!     let world = World::new(&config.world)?;
//!
//!     let kitchen = world.spawn("kitchen", Room::new(1000.0, 14.0, 8.0));
//!     world.create("refrigerator", Refrigerator, &kitchen, "in")?;
//!     println!("kitchen holds {} m3", kitchen.content_size());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`world`] - the containment engine and stock node variants
//! - [`config`] - configuration loading
//! - [`metrics`] - engine counters
//! - [`stress`] - randomized concurrent workload
//! - [`logutil`] - logger setup and log sanitizing

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod stress;
pub mod world;
