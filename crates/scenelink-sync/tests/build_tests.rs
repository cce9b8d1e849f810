// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
//! Full and incremental tree builds against the in-memory remote.

use scenelink_dry_tests::{FakeRemote, RecordingObserver};
use scenelink_proto::{AttrType, AttrValue, Handle};
use scenelink_sync::{Child, ItemKind, SceneEvent, SceneSync, SyncError, TraversalLimits};

fn engine(fake: &FakeRemote) -> SceneSync<FakeRemote> {
    SceneSync::with_limits(fake.clone(), TraversalLimits::unthrottled(5))
}

#[tokio::test]
async fn shared_source_is_fetched_once() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let a = fake.add_node(root, "a", "material");
    let b = fake.add_node(root, "b", "geometry");
    fake.add_pin(b, "front");
    fake.add_pin(b, "back");
    fake.link(b, 0, a);
    fake.link(b, 1, a);

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();

    assert_eq!(scene.tree(), &[a, b]);
    assert_eq!(scene.map().len(), 2);
    assert_eq!(fake.name_fetches(a), 1);
    let b_children: Vec<Option<Handle>> = scene
        .lookup(b)
        .unwrap()
        .children
        .iter()
        .map(Child::handle)
        .collect();
    assert_eq!(b_children, vec![Some(a), Some(a)]);
    assert_eq!(scene.lookup(a).unwrap().level, 1);
}

#[tokio::test]
async fn traversal_stops_at_depth_cap() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let head = fake.add_node(root, "n1", "geometry");
    let mut chain = vec![head];
    for i in 2..=10 {
        let prev = *chain.last().unwrap();
        fake.add_pin(prev, "in");
        chain.push(fake.add_default(prev, 0, &format!("n{i}"), "geometry"));
    }

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();

    assert_eq!(scene.map().len(), 5);
    let deepest = scene.map().iter().map(|(_, r)| r.level).max().unwrap();
    assert_eq!(deepest, 5);
    assert!(scene.lookup(chain[4]).unwrap().children.is_empty());
    assert!(scene.lookup(chain[5]).is_none());
    assert_eq!(fake.call_count("pin_count"), 5);
    assert_eq!(fake.call_count("value_attribute"), 0);
}

#[tokio::test]
async fn pin_cycles_terminate() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let a = fake.add_node(root, "a", "geometry");
    let b = fake.add_node(root, "b", "geometry");
    fake.add_pin(a, "in");
    fake.add_pin(b, "in");
    fake.link(a, 0, b);
    fake.link(b, 0, a);

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();
    assert_eq!(scene.map().len(), 2);
    assert_eq!(scene.lookup(a).unwrap().pin_source(0), Some(b));
    assert_eq!(scene.lookup(b).unwrap().pin_source(0), Some(a));
}

#[tokio::test]
async fn graphs_list_owned_items_as_children() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let group = fake.add_graph(root, "rig");
    let cam = fake.add_node(group, "cam", "camera");
    let light = fake.add_node(group, "key", "light");

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();

    let record = scene.lookup(group).unwrap();
    assert!(record.is_graph());
    assert!(matches!(&record.kind, ItemKind::Graph(info) if info.item_count == 2));
    assert!(record.children.iter().all(Child::is_owned));
    assert_eq!(record.child_handles().collect::<Vec<_>>(), vec![cam, light]);
    assert_eq!(scene.lookup(cam).unwrap().level, 2);
    assert!(scene.is_expanded(cam));
    assert_eq!(sync.children_of(group).len(), 2);
}

#[tokio::test]
async fn unconnected_pins_keep_their_slot() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let mesh = fake.add_node(root, "mesh", "geometry");
    fake.add_pin(mesh, "material");
    fake.add_pin(mesh, "transform");
    let mat = fake.add_default(mesh, 0, "mat", "material");

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();
    let record = scene.lookup(mesh).unwrap();
    assert_eq!(record.children.len(), 2);
    assert_eq!(record.pin_source(0), Some(mat));
    assert!(matches!(&record.children[1], Child::Unconnected(pin) if pin.index == 1));
    assert_eq!(scene.lookup(mat).unwrap().pin_info.as_ref().unwrap().index, 0);
    assert_eq!(scene.connections().count(), 1);
}

#[tokio::test]
async fn leaf_nodes_carry_their_value_attribute() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let mesh = fake.add_node(root, "mesh", "geometry");
    fake.add_pin(mesh, "scale");
    let scale = fake.add_default(mesh, 0, "scale", "float");
    fake.set_value_attr(scale, 7, AttrValue::Float(1.0));

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();
    let attr = scene.lookup(scale).unwrap().value_attribute().unwrap();
    assert_eq!(attr.attr_id, 7);
    assert_eq!(attr.attr_type, AttrType::Float);
    assert!(scene.lookup(mesh).unwrap().value_attribute().is_none());
}

#[tokio::test]
async fn leaves_at_the_depth_cap_stay_editable() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let mesh = fake.add_node(root, "mesh", "geometry");
    fake.add_pin(mesh, "scale");
    fake.add_pin(mesh, "material");
    let scale = fake.add_default(mesh, 0, "scale", "float");
    fake.set_value_attr(scale, 4, AttrValue::Float(2.0));
    let mat = fake.add_default(mesh, 1, "mat", "material");
    fake.add_pin(mat, "albedo");
    fake.set_value_attr(mat, 9, AttrValue::Int(1));

    let mut sync = SceneSync::with_limits(fake.clone(), TraversalLimits::unthrottled(2));
    sync.build_full_tree().await.unwrap();
    let attr = sync.lookup(scale).unwrap().value_attribute().unwrap();
    assert_eq!(attr.attr_id, 4);
    assert_eq!(
        sync.attribute_value(scale).await.unwrap(),
        AttrValue::Float(2.0)
    );
    assert!(sync.lookup(mat).unwrap().value_attribute().is_none());
    assert!(sync.children_of(mat).is_empty());
}

#[tokio::test]
async fn root_failure_keeps_previous_mirror() {
    let fake = FakeRemote::new();
    let root = fake.root();
    fake.add_node(root, "a", "geometry");

    let mut sync = engine(&fake);
    let recorder = RecordingObserver::new();
    sync.subscribe(recorder.clone());
    sync.build_full_tree().await.unwrap();
    let before = sync.scene().clone();

    fake.add_node(root, "b", "geometry");
    fake.fail_on("owned_items", Some(root));
    let err = sync.build_full_tree().await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(sync.scene(), &before);
    assert_eq!(recorder.events(), vec![SceneEvent::TreeReplaced]);
}

#[tokio::test]
async fn branch_failures_are_skipped() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let broken = fake.add_node(root, "broken", "geometry");
    let mesh = fake.add_node(root, "mesh", "geometry");
    fake.add_pin(mesh, "material");
    fake.add_pin(mesh, "uv");
    let mat = fake.add_default(mesh, 0, "mat", "material");
    let uv = fake.add_default(mesh, 1, "uv", "texture");
    fake.fail_on("item_name", Some(broken));
    fake.fail_on("item_name", Some(mat));

    let mut sync = engine(&fake);
    let scene = sync.build_full_tree().await.unwrap();
    assert_eq!(scene.tree(), &[mesh]);
    let record = scene.lookup(mesh).unwrap();
    assert_eq!(record.child_handles().collect::<Vec<_>>(), vec![uv]);
    assert!(scene.lookup(mat).is_none());
    assert!(!scene.is_stale());
}

#[tokio::test]
async fn incremental_build_leaves_known_records_alone() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let a = fake.add_node(root, "a", "material");
    let mut sync = engine(&fake);
    sync.build_full_tree().await.unwrap();
    let before = sync.lookup(a).unwrap().clone();

    let c = fake.add_node(root, "c", "geometry");
    fake.add_pin(c, "material");
    fake.link(c, 0, a);
    fake.reset_counts();

    sync.build_incremental(c).await.unwrap();
    assert_eq!(sync.scene().tree(), &[a, c]);
    assert_eq!(fake.name_fetches(a), 0);
    assert_eq!(fake.name_fetches(c), 1);
    assert_eq!(fake.call_count("owned_items"), 0);
    assert_eq!(sync.lookup(c).unwrap().pin_source(0), Some(a));
    let after = sync.lookup(a).unwrap();
    assert_eq!(after.name, before.name);
    assert_eq!(after.type_tag, before.type_tag);
    assert_eq!(after.children, before.children);
    assert_eq!(after.level, before.level);
}

#[tokio::test]
async fn rebuild_clears_stale_flag_and_picks_up_remote_changes() {
    let fake = FakeRemote::new();
    let root = fake.root();
    let a = fake.add_node(root, "a", "geometry");
    let mut sync = engine(&fake);
    sync.build_full_tree().await.unwrap();

    fake.fail_on("item_name", None);
    sync.create_node("camera").await.unwrap();
    assert!(sync.scene().is_stale());

    fake.clear_failures();
    let scene = sync.build_full_tree().await.unwrap();
    assert!(!scene.is_stale());
    assert_eq!(scene.tree().len(), 2);
    assert_eq!(scene.tree()[0], a);
    assert_eq!(scene.root(), Some(root));
}
