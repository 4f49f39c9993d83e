/// Chat between peers: messages land under their tab on every peer in
/// timestamp order, edits follow, and the writing indicator tracks who is
/// composing until they post, leave or go quiet.

use std::{cell::RefCell, rc::Rc, time::Duration};

use tabletop_peer::{objects::ChatMessage, MessageOptions};
use tabletop_shared::{
    topics::{MessageAddedPayload, MESSAGE_ADDED},
    EntityId,
};
use tabletop_test::TestCluster;

fn cursor_of(cluster: &TestCluster, name: &str) -> EntityId {
    cluster
        .peer(name)
        .presence()
        .my_cursor()
        .expect("every cluster peer has a cursor")
        .identifier()
        .clone()
}

fn post(cluster: &TestCluster, name: &str, tab: &EntityId, text: &str) -> EntityId {
    let cursor = cursor_of(cluster, name);
    cluster
        .peer(name)
        .send_message(tab, text, &cursor, None, &MessageOptions::default())
        .expect("tab exists")
        .identifier()
        .clone()
}

fn texts(cluster: &TestCluster, name: &str, tab: &EntityId) -> Vec<String> {
    let peer = cluster.peer(name);
    let tab = peer
        .registry()
        .get_typed::<tabletop_peer::objects::ChatTab>(tab)
        .expect("tab replicated");
    let messages = tab.borrow().messages(peer.registry());
    messages.iter().map(|message| message.borrow().text()).collect()
}

fn three_peers_with_tab() -> (TestCluster, EntityId) {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.add_peer("carol");
    cluster.connect_all();
    let tab = cluster
        .peer("alice")
        .chat()
        .create_tab("Main")
        .identifier()
        .clone();
    cluster.settle();
    (cluster, tab)
}

#[test]
fn conversation_is_ordered_on_every_peer() {
    let (mut cluster, tab) = three_peers_with_tab();

    post(&cluster, "alice", &tab, "hello");
    cluster.settle();
    // same clock reading, still ordered after alice
    post(&cluster, "bob", &tab, "hi alice");
    cluster.settle();

    for name in ["alice", "bob", "carol"] {
        assert_eq!(texts(&cluster, name, &tab), vec!["hello", "hi alice"]);
    }
}

#[test]
fn remote_messages_announce_message_added() {
    let (mut cluster, tab) = three_peers_with_tab();
    let added: Rc<RefCell<Vec<MessageAddedPayload>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = added.clone();
    let bus = cluster.peer("carol").bus();
    let key = bus.subscriber();
    bus.register(&key).on(MESSAGE_ADDED, move |event| {
        if let Some(payload) = event.data_as::<MessageAddedPayload>() {
            sink.borrow_mut().push(payload);
        }
    });

    let message = post(&cluster, "alice", &tab, "hello");
    cluster.settle();

    assert_eq!(
        *added.borrow(),
        vec![MessageAddedPayload {
            tab_identifier: tab.clone(),
            message_identifier: message.clone(),
        }]
    );
    let copy = cluster
        .peer("carol")
        .registry()
        .get_typed::<ChatMessage>(&message)
        .expect("message replicated");
    assert_eq!(copy.borrow().name(), "alice");
    assert_eq!(copy.borrow().tab_identifier(cluster.peer("carol").registry()), Some(tab));
}

#[test]
fn edits_replace_text_everywhere() {
    let (mut cluster, tab) = three_peers_with_tab();
    let message = post(&cluster, "alice", &tab, "helo");
    cluster.settle();

    cluster.clock().advance(Duration::from_secs(5));
    {
        let alice = cluster.peer("alice");
        let message = alice
            .registry()
            .get_typed::<ChatMessage>(&message)
            .expect("own message");
        alice.chat().edit_message(&message, "hello");
    }
    cluster.settle();

    let copy = cluster
        .peer("bob")
        .registry()
        .get_typed::<ChatMessage>(&message)
        .expect("message replicated");
    assert_eq!(copy.borrow().text(), "hello");
    assert!(copy.borrow().is_edited());
}

#[test]
fn writing_indicator_clears_when_writer_posts() {
    let (mut cluster, tab) = three_peers_with_tab();
    let alice_id = TestCluster::peer_id("alice");

    assert!(cluster.peer("alice").notify_input(&tab, 3, None));
    cluster.settle();

    for name in ["bob", "carol"] {
        let writers = cluster.peer(name).writing().writers(&tab);
        assert_eq!(writers.len(), 1);
        assert_eq!(writers[0].peer_id, alice_id);
        assert_eq!(writers[0].name, "alice");
    }
    assert!(cluster.peer("alice").writing().writing_peers(&tab).is_empty());

    post(&cluster, "alice", &tab, "done");
    cluster.settle();

    assert!(cluster.peer("bob").writing().writing_peers(&tab).is_empty());
    assert!(cluster.peer("carol").writing().writing_peers(&tab).is_empty());
}

#[test]
fn writing_indicator_expires_when_writer_goes_quiet() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init()
        .ok();

    let (mut cluster, tab) = three_peers_with_tab();

    cluster.peer("alice").notify_input(&tab, 1, None);
    cluster.settle();
    cluster.advance(Duration::from_millis(1500));
    assert_eq!(cluster.peer("bob").writing().writing_peers(&tab).len(), 1);

    // still typing, the timeout starts over
    assert!(cluster.peer("alice").notify_input(&tab, 4, None));
    cluster.settle();
    cluster.advance(Duration::from_millis(1500));
    assert_eq!(cluster.peer("bob").writing().writing_peers(&tab).len(), 1);

    cluster.advance(Duration::from_millis(500));
    assert!(cluster.peer("bob").writing().writing_peers(&tab).is_empty());
}

#[test]
fn writing_indicator_clears_when_writer_leaves() {
    let (mut cluster, tab) = three_peers_with_tab();

    cluster.peer("alice").notify_input(&tab, 1, None);
    cluster.settle();
    assert_eq!(cluster.peer("bob").writing().writing_peers(&tab).len(), 1);

    cluster.remove_peer("alice");
    cluster.settle();

    assert!(cluster.peer("bob").writing().writing_peers(&tab).is_empty());
}

#[test]
fn direct_writing_notice_reaches_only_the_recipient() {
    let (mut cluster, tab) = three_peers_with_tab();
    let bob_id = TestCluster::peer_id("bob");

    cluster.peer("alice").notify_input(&tab, 2, Some(&bob_id));
    cluster.settle();

    assert_eq!(cluster.peer("bob").writing().writing_peers(&tab).len(), 1);
    assert!(cluster.peer("carol").writing().writing_peers(&tab).is_empty());
}

#[test]
fn operation_log_lands_only_in_receiving_tabs() {
    let (mut cluster, tab) = three_peers_with_tab();
    let log_tab = cluster.peer("alice").chat().create_tab("Log");
    log_tab.borrow_mut().set_receive_operation_log_level(1);
    let log_tab = log_tab.identifier().clone();
    cluster.settle();

    let posted = cluster.peer("bob").send_operation_log("bob took the dice", 1);
    assert_eq!(posted.len(), 1);
    cluster.settle();

    for name in ["alice", "bob", "carol"] {
        assert_eq!(texts(&cluster, name, &log_tab), vec!["bob took the dice"]);
        assert!(texts(&cluster, name, &tab).is_empty());
    }
    let copy = cluster
        .peer("carol")
        .registry()
        .get_typed::<ChatMessage>(posted[0].identifier())
        .expect("log replicated");
    assert!(copy.borrow().is_operation_log());
    assert_eq!(copy.borrow().name(), "bob");
}
