//! Per-variant capabilities.
//!
//! The engine is generic over anything implementing [`Behavior`]: it asks the
//! behavior for physical bounds, for permission to add and remove contents,
//! and notifies it after changes commit. Measurements receive the node's
//! current content totals so variants whose size or weight depends on their
//! contents (bags, rooms) never have to take locks themselves.
//!
//! `authorize_*` run synchronously while the movement's locks are held and
//! must not call back into mutating [`World`] operations. The `on_*` and
//! `see` hooks run later on the dispatch pool, in order per node, and are
//! free to.

use std::sync::Arc;

use super::node::Node;
use super::stats::{default_width, Stats};
use super::types::{Actor, Detail, Relation, Report};
use super::watch::Sighting;
use super::World;

pub trait Behavior: Send + Sync + 'static {
    /// Text for the requested level of detail.
    fn describe(&self, name: &str, detail: Detail) -> String {
        match detail {
            Detail::Basic => format!("A {}.", name),
            Detail::Detail => format!("There is nothing special about the {}.", name),
            Detail::Inside => format!("The {} has nothing remarkable inside.", name),
        }
    }

    /// Rooms are roots: they never have a container and never move.
    fn is_room(&self) -> bool {
        false
    }

    fn movable(&self) -> bool {
        true
    }

    fn size(&self, contents: &Stats) -> f64;

    fn base_weight(&self) -> f64 {
        0.0
    }

    fn weight(&self, contents: &Stats) -> f64 {
        self.base_weight() + contents.weight
    }

    /// Length along the longest axis.
    fn length(&self) -> f64;

    fn width(&self, contents: &Stats) -> f64 {
        default_width(self.size(contents), self.length())
    }

    fn length_limit(&self) -> f64 {
        0.0
    }

    fn width_limit(&self) -> f64 {
        0.0
    }

    fn available_size(&self, _contents: &Stats) -> f64 {
        0.0
    }

    /// Default rule: only "in", and only if it fits.
    fn authorize_add(
        &self,
        me: &Arc<Node>,
        obj: &Arc<Node>,
        relation: &Relation,
        _actor: &Actor,
        report: &mut dyn Report,
    ) -> bool {
        if !relation.is(Relation::IN) {
            report.report(&format!("You can't put something '{}' the {}.", relation, me.name()));
            return false;
        }
        me.can_fit(obj, report)
    }

    fn authorize_remove(
        &self,
        _me: &Arc<Node>,
        _obj: &Arc<Node>,
        _to: &Arc<Node>,
        _actor: &Actor,
        _report: &mut dyn Report,
    ) -> bool {
        true
    }

    fn on_add(&self, _world: &World, _me: &Arc<Node>, _obj: &Arc<Node>, _actor: &Actor) {}

    /// `to` is None when the object was destroyed.
    fn on_remove(
        &self,
        _world: &World,
        _me: &Arc<Node>,
        _obj: &Arc<Node>,
        _to: Option<&Arc<Node>>,
        _actor: &Actor,
    ) {
    }

    fn on_shift(&self, _world: &World, _me: &Arc<Node>, _obj: &Arc<Node>, _actor: &Actor, _old: &Relation) {}

    fn on_moved(&self, _world: &World, _me: &Arc<Node>, _actor: &Actor) {}

    fn on_shifted(&self, _world: &World, _me: &Arc<Node>, _actor: &Actor, _old: &Relation) {}

    /// Something happened to a node this one watches.
    fn see(&self, _world: &World, _me: &Arc<Node>, _sighting: &Sighting) {}

    fn on_destroyed(&self, _world: &World, _me: &Arc<Node>, _actor: &Actor) {}
}
