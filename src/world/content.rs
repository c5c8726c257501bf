//! Stock node variants.
//!
//! Dimensions are SI: cubic meters, kilograms, meters.

use std::sync::Arc;

use log::debug;

use super::behavior::Behavior;
use super::node::Node;
use super::stats::{default_width, Stats};
use super::types::{Actor, Detail, Relation, Report};
use super::World;

pub const CU_CM: f64 = 1e-6;
pub const GALLON: f64 = 128.0 * 2.957_352_956_25e-5;
pub const METRIC_TON: f64 = 1000.0;
pub const GRAM: f64 = 0.001;
pub const CM: f64 = 0.01;
pub const MM: f64 = 0.001;

/// Root of a containment tree. Size and weight are those of its contents;
/// an unbounded room accepts anything.
#[derive(Debug, Clone)]
pub struct Room {
    size_limit: f64,
    length_limit: f64,
    width_limit: f64,
}

impl Room {
    pub fn new(size_limit: f64, length_limit: f64, width_limit: f64) -> Self {
        Room {
            size_limit,
            length_limit,
            width_limit,
        }
    }

    pub fn unbounded() -> Self {
        Room::new(f64::INFINITY, f64::INFINITY, f64::INFINITY)
    }
}

impl Behavior for Room {
    fn describe(&self, name: &str, detail: Detail) -> String {
        match detail {
            Detail::Basic => format!("The {}.", name),
            Detail::Detail => format!("You are in the {}.", name),
            Detail::Inside => format!("You are in the {}.", name),
        }
    }

    fn is_room(&self) -> bool {
        true
    }

    fn movable(&self) -> bool {
        false
    }

    fn size(&self, contents: &Stats) -> f64 {
        contents.size
    }

    fn length(&self) -> f64 {
        self.length_limit
    }

    fn width(&self, _contents: &Stats) -> f64 {
        self.width_limit
    }

    fn length_limit(&self) -> f64 {
        self.length_limit
    }

    fn width_limit(&self) -> f64 {
        self.width_limit
    }

    fn available_size(&self, contents: &Stats) -> f64 {
        self.size_limit - contents.size
    }
}

/// Large appliance that holds food and chills whatever is put in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Refrigerator;

impl Behavior for Refrigerator {
    fn describe(&self, name: &str, detail: Detail) -> String {
        match detail {
            Detail::Basic => format!("A {}.", name),
            Detail::Detail => format!("A humming white {}.", name),
            Detail::Inside => format!("The {} is cold inside.", name),
        }
    }

    fn size(&self, _contents: &Stats) -> f64 {
        200.0
    }

    fn base_weight(&self) -> f64 {
        12000.0
    }

    fn length(&self) -> f64 {
        10.5
    }

    fn width(&self, _contents: &Stats) -> f64 {
        5.0
    }

    fn length_limit(&self) -> f64 {
        9.0
    }

    fn width_limit(&self) -> f64 {
        4.0
    }

    fn available_size(&self, contents: &Stats) -> f64 {
        108.0 - contents.size
    }

    fn on_add(&self, world: &World, me: &Arc<Node>, obj: &Arc<Node>, _actor: &Actor) {
        if let Err(e) = world.announce(obj, &Actor::Node(Arc::clone(me)), "chill", Some(me)) {
            debug!("{} could not chill {}: {}", me, obj, e);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PointyStick;

impl Behavior for PointyStick {
    fn describe(&self, name: &str, detail: Detail) -> String {
        match detail {
            Detail::Basic => format!("A {}.", name),
            Detail::Detail => format!("The {} is long, thin and sharp at one end.", name),
            Detail::Inside => format!("There is nothing inside the {}.", name),
        }
    }

    fn size(&self, _contents: &Stats) -> f64 {
        0.005
    }

    fn base_weight(&self) -> f64 {
        2.0
    }

    fn length(&self) -> f64 {
        2.0
    }

    fn width(&self, _contents: &Stats) -> f64 {
        0.05
    }
}

/// Flexible bag: it grows with what it holds, up to three gallons.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlasticBag;

impl Behavior for PlasticBag {
    fn size(&self, contents: &Stats) -> f64 {
        contents.size + 10.0 * CU_CM
    }

    fn base_weight(&self) -> f64 {
        0.0055
    }

    fn length(&self) -> f64 {
        0.02
    }

    fn width(&self, _contents: &Stats) -> f64 {
        0.004
    }

    fn length_limit(&self) -> f64 {
        0.5
    }

    fn width_limit(&self) -> f64 {
        0.5
    }

    fn available_size(&self, contents: &Stats) -> f64 {
        3.0 * GALLON - contents.size
    }
}

/// Hollow cube with walls one eighth of its side.
#[derive(Debug, Clone, Copy)]
pub struct DebugCube {
    scale: f64,
}

const CUBE_INNER: f64 = 0.875;

impl DebugCube {
    pub fn new(scale: f64) -> Self {
        DebugCube { scale }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    fn volume(&self) -> f64 {
        self.scale.powi(3)
    }
}

impl Behavior for DebugCube {
    fn describe(&self, name: &str, detail: Detail) -> String {
        match detail {
            Detail::Basic => format!("A {}.", name),
            Detail::Detail => format!("A featureless grey cube, {} meters on a side.", self.scale),
            Detail::Inside => format!("The inside of the {} is as grey as the outside.", name),
        }
    }

    fn size(&self, _contents: &Stats) -> f64 {
        self.volume()
    }

    fn base_weight(&self) -> f64 {
        self.volume() * 1000.0 * (1.0 - CUBE_INNER.powi(3))
    }

    fn length(&self) -> f64 {
        self.scale
    }

    fn width(&self, _contents: &Stats) -> f64 {
        self.scale
    }

    fn length_limit(&self) -> f64 {
        CUBE_INNER * self.scale
    }

    fn width_limit(&self) -> f64 {
        CUBE_INNER * self.scale
    }

    fn available_size(&self, contents: &Stats) -> f64 {
        CUBE_INNER.powi(3) * self.volume() - contents.size
    }
}

/// Fill `container` with `per_level` cubes of side `scale`, then fill each
/// of those with smaller cubes, `depth` levels deep. Returns the cubes
/// created.
pub fn cube_fill(world: &World, container: &Arc<Node>, scale: f64, depth: u32) -> Vec<Arc<Node>> {
    const PER_LEVEL: usize = 8;
    const SHRINK: f64 = 0.436;

    let mut created = Vec::new();
    if depth == 0 {
        return created;
    }
    for i in 0..PER_LEVEL {
        let name = format!("cube{}x{}", depth, i);
        match world.create(&name, DebugCube::new(scale), container, Relation::IN) {
            Ok(cube) => {
                created.extend(cube_fill(world, &cube, scale * SHRINK, depth - 1));
                created.push(cube);
            }
            Err(e) => {
                debug!(target: "creation", "cube fill of {} stopped: {}", container, e);
                break;
            }
        }
    }
    created
}

/// Immovable feature of a room (a counter, a pillar).
#[derive(Debug, Clone)]
pub struct Fixture {
    size: f64,
    weight: f64,
    length: f64,
}

impl Fixture {
    pub fn new(size: f64, weight: f64, length: f64) -> Self {
        Fixture { size, weight, length }
    }
}

impl Behavior for Fixture {
    fn movable(&self) -> bool {
        false
    }

    fn size(&self, _contents: &Stats) -> f64 {
        self.size
    }

    fn base_weight(&self) -> f64 {
        self.weight
    }

    fn length(&self) -> f64 {
        self.length
    }
}

/// Rigid box of fixed outer size. Holds nothing unless built with
/// [`Crate::holding`]; things may also be set on top of a holding crate.
#[derive(Debug, Clone)]
pub struct Crate {
    size: f64,
    weight: f64,
    length: f64,
    capacity: f64,
}

impl Crate {
    pub fn new(size: f64, weight: f64, length: f64) -> Self {
        Crate::holding(size, weight, length, 0.0)
    }

    pub fn holding(size: f64, weight: f64, length: f64, capacity: f64) -> Self {
        Crate {
            size,
            weight,
            length,
            capacity,
        }
    }
}

impl Behavior for Crate {
    fn size(&self, _contents: &Stats) -> f64 {
        self.size
    }

    fn base_weight(&self) -> f64 {
        self.weight
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn length_limit(&self) -> f64 {
        if self.capacity > 0.0 {
            self.length
        } else {
            0.0
        }
    }

    fn width_limit(&self) -> f64 {
        if self.capacity > 0.0 {
            default_width(self.size, self.length)
        } else {
            0.0
        }
    }

    fn available_size(&self, contents: &Stats) -> f64 {
        self.capacity - contents.size
    }

    fn authorize_add(
        &self,
        me: &Arc<Node>,
        obj: &Arc<Node>,
        relation: &Relation,
        _actor: &Actor,
        report: &mut dyn Report,
    ) -> bool {
        if !relation.is(Relation::IN) && !relation.is(Relation::ON) {
            report.report(&format!("You can't put something '{}' the {}.", relation, me.name()));
            return false;
        }
        me.can_fit(obj, report)
    }
}
