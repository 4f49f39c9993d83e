/// Object replication across peers: what goes out when an object changes,
/// what a peer joining late receives, and how destroy notices spread.
///
/// Every peer here runs the full stack over the in-process hub, so a
/// context crosses the same JSON encoding as on a socket.

use std::{cell::Cell, rc::Rc};

use proptest::prelude::*;

use tabletop_peer::objects::{register_kinds, ChatPalette, GameCharacter};
use tabletop_shared::{
    topics::DELETE_GAME_OBJECT, EventBus, ObjectRegistry, PeerCursor, PeerId, RegistryError,
    Replicate, SyncContext, UserId,
};
use tabletop_test::{cursor_name, TestCluster};

fn registry() -> ObjectRegistry {
    let registry = ObjectRegistry::new(&EventBus::new(PeerId::from("p-solo")));
    register_kinds(&registry);
    registry
}

type CharacterParams = (String, u8, i32, i32, bool, Option<String>);

fn params_strategy() -> impl Strategy<Value = CharacterParams> {
    (
        "[a-zA-Z ]{0,12}",
        1u8..20,
        -500i32..500,
        -500i32..500,
        any::<bool>(),
        prop::option::of("[a-z]{1,8}"),
    )
}

fn character((name, size, x, y, is_drop_shadow, owner): CharacterParams) -> GameCharacter {
    let mut character = GameCharacter::create(&name, f64::from(size), "image-1");
    character.set_position(f64::from(x), f64::from(y), 0.0);
    character.set_drop_shadow(is_drop_shadow);
    let owner: Option<UserId> = owner.map(UserId::from);
    character.set_owner(owner.as_ref());
    character
}

proptest! {
    /// A context that crosses the wire rebuilds an object with the same state
    #[test]
    fn context_round_trips_through_the_wire(params in params_strategy()) {
        let context = character(params).to_context();
        let encoded = serde_json::to_string(&context).unwrap();
        let decoded: SyncContext = serde_json::from_str(&encoded).unwrap();

        let registry = registry();
        let rebuilt = registry.receive_context(&decoded).unwrap();

        prop_assert_eq!(rebuilt.alias_name(), "character");
        prop_assert_eq!(rebuilt.borrow().to_context().sync_data, context.sync_data);
    }

    /// Applying the same context twice changes nothing the second time
    #[test]
    fn applying_a_context_is_idempotent(
        source in params_strategy(),
        target in params_strategy(),
    ) {
        let context = character(source).to_context();
        let mut target = character(target);

        target.base_mut().apply(&context);
        let once = target.to_context().sync_data;
        let changed = target.base_mut().apply(&context);

        prop_assert!(!changed);
        prop_assert_eq!(target.to_context().sync_data, once);
    }
}

#[test]
fn removed_object_is_no_longer_found() {
    let registry = registry();
    let character = registry.add(GameCharacter::create("Goblin", 1.0, ""));
    let identifier = character.identifier().clone();

    let removed = registry.remove(&identifier);

    assert_eq!(removed, vec![identifier.clone()]);
    assert!(registry.get(&identifier).is_none());
    assert!(registry.get_objects_of::<GameCharacter>().is_empty());
    assert!(!registry.is_destroyed(&identifier));
}

#[test]
fn local_changes_reach_every_peer() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.add_peer("carol");
    cluster.connect_all();

    let character = cluster
        .peer("alice")
        .registry()
        .add(GameCharacter::create("Goblin", 2.0, "goblin.png"));
    cluster.settle();
    character.borrow_mut().set_position(10.0, 20.0, 0.0);
    cluster.settle();

    for name in ["bob", "carol"] {
        let copy = cluster
            .peer(name)
            .registry()
            .get_typed::<GameCharacter>(character.identifier())
            .unwrap_or_else(|| panic!("{} has no copy", name));
        assert_eq!(copy.borrow().name(), "Goblin");
        assert_eq!(copy.borrow().size(), 2.0);
        assert_eq!(copy.borrow().position(), (10.0, 20.0, 0.0));
    }
}

#[test]
fn local_removal_stays_local() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.connect_all();

    let character = cluster
        .peer("alice")
        .registry()
        .add(GameCharacter::create("Goblin", 1.0, ""));
    cluster.settle();
    cluster.peer("alice").registry().remove(character.identifier());
    cluster.settle();

    assert!(!cluster.peer("alice").registry().contains(character.identifier()));
    assert!(cluster.peer("bob").registry().contains(character.identifier()));
}

#[test]
fn late_joiner_receives_snapshot_with_tree() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.connect_all();

    let (character, palette) = {
        let registry = cluster.peer("alice").registry();
        let character = registry.add(GameCharacter::create("Goblin", 1.0, ""));
        let palette =
            registry.add_child(character.identifier(), ChatPalette::for_character(character.identifier()));
        palette.borrow_mut().set_palette("Attack 1d20\nFlee");
        (character, palette)
    };
    cluster.settle();

    cluster.add_peer("carol");
    cluster.connect("carol", "alice");
    cluster.settle();

    let carol = cluster.peer("carol");
    assert!(carol.registry().contains(character.identifier()));
    assert_eq!(
        carol.registry().parent_of(palette.identifier()),
        Some(character.identifier().clone())
    );
    let copy = carol
        .registry()
        .get_typed::<ChatPalette>(palette.identifier())
        .unwrap();
    assert_eq!(copy.borrow().palette_lines(), vec!["Attack 1d20", "Flee"]);

    // cursors relayed by alice arrive too, bob never linked to carol
    assert_eq!(cursor_name(carol, "alice"), Some("alice".to_string()));
    assert_eq!(cursor_name(carol, "bob"), Some("bob".to_string()));
    assert_eq!(carol.registry().get_objects_of::<PeerCursor>().len(), 3);
}

#[test]
fn destroy_spreads_and_blocks_stale_contexts() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.connect_all();

    let (character, palette) = {
        let registry = cluster.peer("alice").registry();
        let character = registry.add(GameCharacter::create("Goblin", 1.0, ""));
        let palette =
            registry.add_child(character.identifier(), ChatPalette::for_character(character.identifier()));
        (character, palette)
    };
    cluster.settle();
    let stale = cluster
        .peer("bob")
        .registry()
        .context(character.identifier())
        .unwrap();

    let deletes = Rc::new(Cell::new(0));
    let counter = deletes.clone();
    let bus = cluster.peer("bob").bus();
    let key = bus.subscriber();
    bus.register(&key)
        .on(DELETE_GAME_OBJECT, move |_| counter.set(counter.get() + 1));

    let destroyed = cluster.peer("alice").registry().destroy(character.identifier());
    assert_eq!(destroyed.len(), 2);
    cluster.settle();

    let bob = cluster.peer("bob");
    assert!(!bob.registry().contains(character.identifier()));
    assert!(!bob.registry().contains(palette.identifier()));
    assert!(bob.registry().is_destroyed(palette.identifier()));
    assert_eq!(deletes.get(), 2);
    assert!(matches!(
        bob.registry().receive_context(&stale),
        Err(RegistryError::Destroyed { .. })
    ));
}
