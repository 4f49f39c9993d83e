/// Event bus behavior seen from outside: handler order on one peer, and
/// how `call` and `send` reach the other peers of a cluster.

use std::{cell::RefCell, rc::Rc};

use serde_json::json;

use tabletop_shared::{EventBus, PeerId};
use tabletop_test::TestCluster;

type Log = Rc<RefCell<Vec<String>>>;

fn recorder(log: &Log, label: &str) -> impl Fn(&tabletop_shared::Event) + 'static {
    let log = log.clone();
    let label = label.to_string();
    move |event| {
        log.borrow_mut().push(format!(
            "{}:{}:{}",
            label, event.send_from, event.is_send_from_self
        ))
    }
}

#[test]
fn handlers_run_in_registration_order() {
    let bus = EventBus::new(PeerId::from("p-solo"));
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let key = bus.subscriber();
        bus.register(&key).on("TABLE_PING", recorder(&log, label));
    }
    bus.trigger("TABLE_PING", &json!({ "n": 1 }));

    assert_eq!(
        *log.borrow(),
        vec![
            "first:p-solo:true".to_string(),
            "second:p-solo:true".to_string(),
            "third:p-solo:true".to_string(),
        ]
    );
}

#[test]
fn handler_unregistered_mid_dispatch_is_skipped() {
    let bus = EventBus::new(PeerId::from("p-solo"));
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let first = bus.subscriber();
    let second = bus.subscriber();
    let inner_bus = bus.clone();
    let inner_log = log.clone();
    bus.register(&first).on("TABLE_PING", move |_| {
        inner_log.borrow_mut().push("first".to_string());
        inner_bus.unregister(&second);
    });
    bus.register(&second).on("TABLE_PING", recorder(&log, "second"));

    bus.trigger("TABLE_PING", &json!(null));
    bus.trigger("TABLE_PING", &json!(null));

    assert_eq!(*log.borrow(), vec!["first".to_string(), "first".to_string()]);
}

#[test]
fn call_reaches_local_and_remote_handlers() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.add_peer("carol");
    cluster.connect_all();

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    for name in ["alice", "bob", "carol"] {
        let bus = cluster.peer(name).bus();
        let key = bus.subscriber();
        bus.register(&key).on("TABLE_PING", recorder(&log, name));
    }

    cluster
        .peer("alice")
        .bus()
        .call("TABLE_PING", &json!({ "n": 1 }), None);
    cluster.settle();

    let mut seen = log.borrow().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "alice:p-alice:true".to_string(),
            "bob:p-alice:false".to_string(),
            "carol:p-alice:false".to_string(),
        ]
    );
}

#[test]
fn targeted_send_reaches_only_the_target() {
    let mut cluster = TestCluster::new();
    cluster.add_peer("alice");
    cluster.add_peer("bob");
    cluster.add_peer("carol");
    cluster.connect_all();

    let log: Log = Rc::new(RefCell::new(Vec::new()));
    for name in ["alice", "bob", "carol"] {
        let bus = cluster.peer(name).bus();
        let key = bus.subscriber();
        bus.register(&key).on("TABLE_PING", recorder(&log, name));
    }

    let bob = TestCluster::peer_id("bob");
    cluster
        .peer("alice")
        .bus()
        .send("TABLE_PING", &json!("psst"), Some(&bob));
    cluster.settle();

    assert_eq!(*log.borrow(), vec!["bob:p-alice:false".to_string()]);
}
