/// Presence across peers: cursor renames, identity lookups, and the grace
/// period a disconnected participant gets before their cursor is removed.

use std::{cell::Cell, rc::Rc, time::Duration};

use tabletop_shared::{
    topics::{ObjectEventPayload, DELETE_GAME_OBJECT},
    PeerCursor, UserId,
};
use tabletop_test::{cursor_name, TestCluster};

fn two_peers() -> TestCluster {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.connect_all();
    cluster
}

#[test]
fn rename_reaches_other_peers() {
    let mut cluster = two_peers();
    assert_eq!(cursor_name(cluster.peer("bob"), "alice"), Some("alice".to_string()));

    cluster.peer_mut("alice").create_my_cursor("Alicia");
    cluster.settle();

    let bob = cluster.peer("bob");
    assert_eq!(cursor_name(bob, "alice"), Some("Alicia".to_string()));
    assert_eq!(bob.registry().get_objects_of::<PeerCursor>().len(), 2);
}

#[test]
fn find_by_user_id_follows_the_participant() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.settle();

    // not linked yet
    assert!(cluster
        .peer("bob")
        .presence()
        .find_by_user_id(&UserId::from("alice"))
        .is_none());

    cluster.connect_all();
    let found = cluster
        .peer("bob")
        .presence()
        .find_by_user_id(&UserId::from("alice"))
        .expect("alice is on the table");
    assert_eq!(found.borrow().peer_id(), TestCluster::peer_id("alice"));
    assert!(cluster
        .peer("bob")
        .presence()
        .find_by_peer_id(&TestCluster::peer_id("alice"))
        .is_some());

    cluster.remove_peer("alice");
    cluster.settle();
    cluster.advance(Duration::from_secs(30));

    let bob = cluster.peer("bob");
    assert!(bob.presence().find_by_user_id(&UserId::from("alice")).is_none());
    assert!(bob
        .presence()
        .find_by_peer_id(&TestCluster::peer_id("alice"))
        .is_none());
}

#[test]
fn reconnect_within_grace_keeps_cursor() {
    let mut cluster = two_peers();
    let alice_id = TestCluster::peer_id("alice");
    let bob_id = TestCluster::peer_id("bob");

    assert!(cluster.hub().sever(&alice_id, &bob_id));
    cluster.settle();
    assert_eq!(cluster.peer("bob").presence().pending_removals().len(), 1);

    cluster.advance(Duration::from_secs(10));
    cluster.connect("alice", "bob");
    cluster.settle();
    cluster.advance(Duration::from_secs(60));

    let bob = cluster.peer("bob");
    assert_eq!(cursor_name(bob, "alice"), Some("alice".to_string()));
    assert!(bob.presence().pending_removals().is_empty());
    assert!(cluster.peer("alice").presence().pending_removals().is_empty());
}

#[test]
fn grace_expiry_removes_cursor_once() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();

    let mut cluster = two_peers();

    let cursor_deletes = Rc::new(Cell::new(0));
    let counter = cursor_deletes.clone();
    let bus = cluster.peer("bob").bus();
    let key = bus.subscriber();
    bus.register(&key).on(DELETE_GAME_OBJECT, move |event| {
        if let Some(payload) = event.data_as::<ObjectEventPayload>() {
            if payload.alias_name == "PeerCursor" {
                counter.set(counter.get() + 1);
            }
        }
    });

    cluster.remove_peer("alice");
    cluster.settle();
    cluster.advance(Duration::from_secs(29));
    assert_eq!(cursor_name(cluster.peer("bob"), "alice"), Some("alice".to_string()));
    assert_eq!(cursor_deletes.get(), 0);

    cluster.advance(Duration::from_secs(1));
    assert_eq!(cursor_name(cluster.peer("bob"), "alice"), None);
    assert_eq!(cursor_deletes.get(), 1);

    cluster.advance(Duration::from_secs(60));
    let bob = cluster.peer("bob");
    assert_eq!(cursor_deletes.get(), 1);
    assert!(bob.presence().pending_removals().is_empty());
    assert!(bob.presence().index().cached_user(&UserId::from("alice")).is_none());
    assert!(bob
        .presence()
        .index()
        .cached_peer(&TestCluster::peer_id("alice"))
        .is_none());
    assert_eq!(bob.registry().get_objects_of::<PeerCursor>().len(), 1);
    assert_eq!(bob.scheduler().pending_count(), 0);
}
