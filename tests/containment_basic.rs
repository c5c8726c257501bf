use std::sync::Arc;

use worldtree::world::content::{Crate, PlasticBag, Refrigerator, Room};
use worldtree::world::{
    Actor, Detail, InlineDispatch, Node, NullReport, Relation, TextReport, Tuning, World, WorldError,
};

fn world() -> World {
    World::with_dispatcher(Tuning::default(), InlineDispatch)
}

fn kitchen(w: &World) -> Arc<Node> {
    w.spawn("kitchen", Room::new(1000.0, 14.0, 8.0))
}

#[test]
fn refrigerators_fill_the_kitchen_then_clear_out() {
    let w = world();
    let room = kitchen(&w);
    let mut fridges = Vec::new();
    for _ in 0..5 {
        fridges.push(w.create("refrigerator", Refrigerator, &room, Relation::IN).unwrap());
    }
    assert_eq!(room.content_count(), 5);
    assert_eq!(room.content_size(), 1000.0);
    assert_eq!(room.content_weight(), 60000.0);
    assert_eq!(room.longest_content(), 10.5);
    assert_eq!(room.widest_content(), 5.0);

    let before = room.content_stats();
    let sixth = w.spawn("refrigerator", Refrigerator);
    let mut report = TextReport::new();
    assert!(!w.commit(&sixth, &room, Relation::IN, &mut report).unwrap());
    assert_eq!(report.text(), "The refrigerator is too large.");
    assert_eq!(room.content_stats(), before);
    assert!(sixth.is_doomed());

    for fridge in &fridges {
        assert!(w.destroy(fridge, &Actor::System).unwrap());
    }
    assert_eq!(room.content_size(), 0.0);
    assert_eq!(room.content_count(), 0);
    assert_eq!(room.longest_content(), 0.0);
}

#[test]
fn cannot_move_into_own_descendant() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let outer = w.create("crate", Crate::holding(4.0, 10.0, 2.0, 3.0), &room, Relation::IN).unwrap();
    let inner = w.create("chest", Crate::holding(1.0, 2.0, 1.0, 0.5), &outer, Relation::IN).unwrap();

    let mut report = TextReport::new();
    assert!(!w.add(&outer, &inner, Relation::IN, &Actor::System, &mut report).unwrap());
    assert_eq!(report.text(), "You cannot put something inside itself.");
    assert!(room.contains(&outer));
    assert!(outer.contains(&inner));

    let mut report = TextReport::new();
    assert!(!w.add(&outer, &outer, Relation::IN, &Actor::System, &mut report).unwrap());
    assert_eq!(report.text(), "You cannot put something inside itself.");
    assert_eq!(w.metrics().cycles_refused, 1);
    assert!(w.audit().is_clean());
}

#[test]
fn shifting_in_place_is_idempotent() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let table = w.create("table", Crate::holding(2.0, 30.0, 2.0, 1.0), &room, Relation::IN).unwrap();
    let cup = w.create("cup", Crate::new(0.001, 0.2, 0.1), &table, Relation::IN).unwrap();
    let before = table.content_stats();

    let mut report = TextReport::new();
    assert!(!w.add(&cup, &table, Relation::IN, &Actor::System, &mut report).unwrap());
    assert_eq!(report.text(), "The cup is already there.");
    assert_eq!(table.content_stats(), before);

    assert!(w.add(&cup, &table, Relation::ON, &Actor::System, &mut NullReport).unwrap());
    assert_eq!(cup.relation(), Relation::new("on"));
    assert_eq!(table.content_stats(), before);
    assert_eq!(table.content_count(), 1);
    assert_eq!(w.metrics().shifts, 1);
    assert_eq!(w.metrics().moves, 0);
}

#[test]
fn remove_falls_up_with_the_containers_relation() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let table = w.create("table", Crate::holding(2.0, 30.0, 2.0, 1.0), &room, Relation::IN).unwrap();
    let tray = w.create("tray", Crate::holding(0.1, 1.0, 0.5, 0.05), &table, Relation::ON).unwrap();
    let spoon = w.create("spoon", Crate::new(0.0001, 0.05, 0.2), &tray, Relation::IN).unwrap();

    assert!(w.remove(&spoon, &Actor::System, &mut NullReport).unwrap());
    assert!(table.contains(&spoon));
    assert_eq!(spoon.relation(), Relation::new("on"));

    // directly in a room there is nowhere to fall; the object is destroyed
    assert!(w.remove(&table, &Actor::System, &mut NullReport).unwrap());
    assert!(table.is_doomed());
    assert!(tray.is_doomed());
    assert!(spoon.is_doomed());
    assert_eq!(room.content_count(), 0);
}

#[test]
fn nested_changes_propagate_to_the_room() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let bag = w.create("bag", PlasticBag, &room, Relation::IN).unwrap();
    let inner = w.create("inner bag", PlasticBag, &bag, Relation::IN).unwrap();
    let empty_bag = 10.0 * worldtree::world::content::CU_CM;
    assert!((room.content_size() - 2.0 * empty_bag).abs() < 1e-15);

    let pebble = w.create("pebble", Crate::new(0.0005, 1.5, 0.05), &room, Relation::IN).unwrap();
    assert!(w.add(&pebble, &inner, Relation::IN, &Actor::System, &mut NullReport).unwrap());
    assert!((room.content_size() - (2.0 * empty_bag + 0.0005)).abs() < 1e-12);
    assert!((room.content_weight() - (2.0 * 0.0055 + 1.5)).abs() < 1e-12);
    assert!((bag.stats().size - bag.measure().size).abs() < 1e-15);
    assert!(w.audit().is_clean());
}

#[test]
fn placement_reports_each_bound() {
    let w = world();
    let room = w.spawn("closet", Room::new(1.0, 1.0, 0.5));
    let mut report = TextReport::new();
    let wide = w.spawn("plank", Crate::new(0.9, 1.0, 0.9));
    assert!(!w.commit(&wide, &room, Relation::IN, &mut report).unwrap());
    assert_eq!(report.text(), "The plank is too wide.");

    let mut report = TextReport::new();
    let long = w.spawn("pole", Crate::new(0.01, 1.0, 2.0));
    assert!(!w.commit(&long, &room, Relation::IN, &mut report).unwrap());
    assert_eq!(report.text(), "The pole is too long.");

    let fits = w.spawn("box", Crate::new(0.1, 1.0, 0.5));
    assert!(room.fits(&fits));
    let mut report = TextReport::new();
    assert!(!w.commit(&fits, &room, Relation::ON, &mut report).unwrap());
    assert_eq!(report.text(), "You can't put something 'on' the closet.");
}

#[test]
fn destroyed_nodes_are_refused_not_faulted() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let a = w.create("box", Crate::new(0.1, 1.0, 0.5), &room, Relation::IN).unwrap();
    let b = w.create("crate", Crate::holding(1.0, 1.0, 1.0, 0.5), &room, Relation::IN).unwrap();
    assert!(w.destroy(&a, &Actor::System).unwrap());
    assert!(!w.destroy(&a, &Actor::System).unwrap());

    let mut report = TextReport::new();
    assert!(!w.add(&a, &b, Relation::IN, &Actor::System, &mut report).unwrap());
    assert_eq!(report.text(), "The box no longer exists.");

    let loose = w.spawn("loose", Crate::new(0.1, 1.0, 0.5));
    assert_eq!(
        w.destroy(&loose, &Actor::System),
        Err(WorldError::NotInitialized { node: loose.id() })
    );
    assert_eq!(
        w.commit(&loose, &a, Relation::IN, &mut NullReport),
        Err(WorldError::NotLive { node: a.id() })
    );
}

#[test]
fn lookup_and_tree_queries() {
    let w = world();
    let room = w.spawn("hall", Room::unbounded());
    let chest = w.create("chest", Crate::holding(1.0, 5.0, 1.0, 0.8), &room, Relation::IN).unwrap();
    let purse = w.create("purse", Crate::holding(0.01, 0.1, 0.2, 0.005), &chest, Relation::IN).unwrap();
    let coin = w.create("coin", Crate::new(0.00001, 0.01, 0.02), &purse, Relation::IN).unwrap();
    let lamp = w.create("lamp", Crate::new(0.01, 1.0, 0.4), &room, Relation::IN).unwrap();

    assert!(Arc::ptr_eq(&w.lookup(coin.id()).unwrap(), &coin));
    let found = w.find_by_internal_name(coin.internal_name()).unwrap();
    assert!(Arc::ptr_eq(&found, &coin));
    assert!(w.find_by_internal_name("coin_0").is_none());
    assert!(w.find_by_internal_name("no-suffix").is_none());

    assert!(Arc::ptr_eq(&coin.room().unwrap(), &room));
    assert!(chest.contains_deep(&coin));
    assert!(!chest.contains(&coin));
    assert!(chest.is_directly_in_room());
    assert!(!coin.is_directly_in_room());
    assert!(Arc::ptr_eq(&coin.common_container(&lamp).unwrap(), &room));
    assert!(Arc::ptr_eq(&coin.common_container(&purse).unwrap(), &purse));
    assert_eq!(room.content_count_deep(), 4);
    assert_eq!(coin.describe(Detail::Basic), "A coin.");

    assert!(w.destroy(&chest, &Actor::System).unwrap());
    assert!(w.lookup(coin.id()).is_none());
    assert!(w.find_by_internal_name(coin.internal_name()).is_none());
}

#[test]
fn removals_spend_the_recompute_budget() {
    let tuning = Tuning {
        recompute_interval: 2,
        ..Tuning::default()
    };
    let w = World::with_dispatcher(tuning, InlineDispatch);
    let room = w.spawn("hall", Room::unbounded());
    let chest = w.create("chest", Crate::holding(1.0, 5.0, 1.0, 0.5), &room, Relation::IN).unwrap();
    let mut cups = Vec::new();
    for _ in 0..3 {
        cups.push(w.create("cup", Crate::new(0.01, 0.5, 0.2), &chest, Relation::IN).unwrap());
    }
    assert_eq!(chest.full_recomputes(), 0);

    assert!(w.add(&cups[0], &room, Relation::IN, &Actor::System, &mut NullReport).unwrap());
    assert_eq!(chest.full_recomputes(), 0);
    // size and weight both run out of budget on the second removal
    assert!(w.add(&cups[1], &room, Relation::IN, &Actor::System, &mut NullReport).unwrap());
    assert_eq!(chest.full_recomputes(), 2);
    assert!((chest.content_size() - 0.01).abs() < 1e-15);
    assert!((chest.content_weight() - 0.5).abs() < 1e-15);
    assert!(w.audit().is_clean());
}
