use super::message::{DeliveryReport, Event, Message};
use super::session::{Dispatch, Session};
use super::state::{CommitState, ConnectionState};
use crate::transport::Packet;
use crate::utils::ClientError;
use serde_json::json;
use tokio::sync::oneshot;

fn connected(auto_commit: bool) -> Session {
    let mut session = Session::new(auto_commit);
    session.begin_connecting();
    assert!(matches!(
        session.handle(Packet::Connect),
        Dispatch::Emit(Event::Connected)
    ));
    session
}

fn data_packet(timestamp: i64) -> Packet {
    Packet::event(
        "data",
        vec![
            json!({"headers": {"from": "topicA", "to": "topicA"}, "content": "Testing 1-2-3"}),
            json!("samplekey"),
            json!(timestamp),
        ],
    )
}

fn report(key: &str) -> Packet {
    Packet::event("delivery-report", vec![json!({"key": key, "timestamp": 42})])
}

#[test]
fn session_starts_disconnected_and_connects() {
    let mut session = Session::new(true);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    session.begin_connecting();
    assert_eq!(session.state(), ConnectionState::Connecting);
    session.handle(Packet::Connect);
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::Idle)
    );
    assert!(matches!(session.handle(Packet::Connect), Dispatch::Nothing));
}

#[test]
fn operations_require_a_connection() {
    let mut session = Session::new(false);
    let (tx, _rx) = oneshot::channel();
    assert!(matches!(
        session.subscribe(vec!["topicA".into()], tx),
        Err(ClientError::NotConnected)
    ));
    let (tx, _rx) = oneshot::channel();
    assert!(matches!(
        session.produce(&Message::new("a", "b", "c"), "k".into(), tx),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(session.commit(), Err(ClientError::NotConnected)));
}

#[test]
fn manual_commit_cycles_between_idle_and_awaiting() {
    let mut session = connected(false);

    match session.handle(data_packet(1700000000000)) {
        Dispatch::Data {
            payload,
            key,
            timestamp,
        } => {
            assert_eq!(payload["content"], "Testing 1-2-3");
            assert_eq!(key, "samplekey");
            assert_eq!(timestamp, 1700000000000);
        }
        other => panic!("Expected data, got {other:?}"),
    }
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::AwaitingCommit)
    );

    let packet = session.commit().unwrap().expect("commit packet");
    assert_eq!(packet.encode(), r#"42["commit"]"#);
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::Idle)
    );

    assert!(session.commit().unwrap().is_none());
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::Idle)
    );
}

#[test]
fn auto_commit_never_awaits_commit() {
    let mut session = connected(true);
    session.handle(data_packet(5));
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::Idle)
    );
    assert!(session.commit().unwrap().is_none());
}

#[test]
fn data_without_timestamp_is_a_protocol_error() {
    let mut session = connected(false);
    let packet = Packet::event("data", vec![json!({"content": "x"}), json!("k")]);
    assert!(matches!(
        session.handle(packet),
        Dispatch::Emit(Event::Error(ClientError::Protocol(_)))
    ));
    assert_eq!(
        session.state(),
        ConnectionState::Connected(CommitState::Idle)
    );
}

#[test]
fn data_with_null_key_and_string_timestamp() {
    let mut session = connected(true);
    let packet = Packet::event(
        "data",
        vec![json!({"content": "x"}), json!(null), json!("123")],
    );
    match session.handle(packet) {
        Dispatch::Data { key, timestamp, .. } => {
            assert_eq!(key, "");
            assert_eq!(timestamp, 123);
        }
        other => panic!("Expected data, got {other:?}"),
    }
}

#[test]
fn subscribe_ack_with_error_fails_the_call() {
    let mut session = connected(true);
    let (tx, mut rx) = oneshot::channel();
    let packet = session.subscribe(vec!["nowhere".into()], tx).unwrap();
    assert_eq!(packet.encode(), r#"420["subscribe",["nowhere"]]"#);

    session.handle(Packet::Ack {
        id: 0,
        args: vec![json!("Unknown destination nowhere")],
    });

    match rx.try_recv().unwrap() {
        Err(ClientError::Subscribe(msg)) => assert_eq!(msg, "Unknown destination nowhere"),
        other => panic!("Expected Subscribe error, got {other:?}"),
    }
    assert!(session.subscriptions().is_empty());
    assert_eq!(session.pending_calls(), 0);
}

#[test]
fn subscribe_ack_records_destinations() {
    let mut session = connected(true);
    let (tx, mut rx) = oneshot::channel();
    session
        .subscribe(vec!["topicA".into(), "topicB".into()], tx)
        .unwrap();
    session.handle(Packet::Ack {
        id: 0,
        args: vec![json!(null), json!({"subscribed": ["topicA", "topicB"]})],
    });

    let result = rx.try_recv().unwrap().unwrap();
    assert_eq!(result["subscribed"][1], "topicB");
    assert_eq!(session.subscriptions(), ["topicA", "topicB"]);
}

#[test]
fn delivery_reports_match_issued_keys() {
    let mut session = connected(true);
    let message = Message::new("topicA", "topicA", "Testing 1-2-3");

    let (tx, mut rx) = oneshot::channel();
    let packet = session.produce(&message, "samplekey".into(), tx).unwrap();
    match &packet {
        Packet::Event { id, name, args } => {
            assert_eq!(*id, Some(0));
            assert_eq!(name, "produce");
            assert_eq!(args[0]["content"], "Testing 1-2-3");
            assert!(args[0]["headers"].get("signature").is_none());
            assert_eq!(args[1], "samplekey");
        }
        other => panic!("Expected event, got {other:?}"),
    }

    session.handle(Packet::Ack {
        id: 0,
        args: vec![json!(null)],
    });
    assert!(rx.try_recv().unwrap().is_ok());

    match session.handle(report("samplekey")) {
        Dispatch::Emit(Event::DeliveryReport(report)) => assert_eq!(
            report,
            DeliveryReport {
                key: "samplekey".into(),
                timestamp: 42
            }
        ),
        other => panic!("Expected delivery report, got {other:?}"),
    }

    assert!(matches!(
        session.handle(report("samplekey")),
        Dispatch::Emit(Event::Error(ClientError::Protocol(_)))
    ));
}

#[test]
fn buffer_keys_are_decoded_as_text() {
    let mut session = connected(true);
    let buffer_key = json!({"type": "Buffer", "data": b"samplekey".to_vec()});

    let packet = Packet::event(
        "data",
        vec![json!({"content": "x"}), buffer_key.clone(), json!(7)],
    );
    match session.handle(packet) {
        Dispatch::Data { key, .. } => assert_eq!(key, "samplekey"),
        other => panic!("Expected data, got {other:?}"),
    }

    let (tx, _rx) = oneshot::channel();
    let message = Message::new("topicA", "topicA", "Testing 1-2-3");
    session.produce(&message, "samplekey".into(), tx).unwrap();
    let report = Packet::event(
        "delivery-report",
        vec![json!({"key": buffer_key, "timestamp": 42})],
    );
    match session.handle(report) {
        Dispatch::Emit(Event::DeliveryReport(report)) => assert_eq!(report.key, "samplekey"),
        other => panic!("Expected delivery report, got {other:?}"),
    }
}

#[test]
fn numeric_data_key_keeps_its_json_text() {
    let mut session = connected(true);
    let packet = Packet::event("data", vec![json!({"content": "x"}), json!(17), json!(1)]);
    match session.handle(packet) {
        Dispatch::Data { key, .. } => assert_eq!(key, "17"),
        other => panic!("Expected data, got {other:?}"),
    }
}

#[test]
fn repeated_keys_are_counted() {
    let mut session = connected(true);
    let message = Message::new("a", "a", "x");
    for _ in 0..2 {
        let (tx, _rx) = oneshot::channel();
        session.produce(&message, "samplekey".into(), tx).unwrap();
    }
    assert!(matches!(
        session.handle(report("samplekey")),
        Dispatch::Emit(Event::DeliveryReport(_))
    ));
    assert!(matches!(
        session.handle(report("samplekey")),
        Dispatch::Emit(Event::DeliveryReport(_))
    ));
    assert!(matches!(
        session.handle(report("samplekey")),
        Dispatch::Emit(Event::Error(ClientError::Protocol(_)))
    ));
}

#[test]
fn rejected_produce_releases_its_key() {
    let mut session = connected(true);
    let (tx, mut rx) = oneshot::channel();
    session
        .produce(&Message::new("a", "a", "x"), "k1".into(), tx)
        .unwrap();
    session.handle(Packet::Ack {
        id: 0,
        args: vec![json!({"message": "destination closed"})],
    });

    match rx.try_recv().unwrap() {
        Err(ClientError::Publish(msg)) => assert_eq!(msg, "destination closed"),
        other => panic!("Expected Publish error, got {other:?}"),
    }
    assert!(matches!(
        session.handle(report("k1")),
        Dispatch::Emit(Event::Error(ClientError::Protocol(_)))
    ));
}

#[test]
fn ack_for_unknown_call_is_a_protocol_error() {
    let mut session = connected(true);
    assert!(matches!(
        session.handle(Packet::Ack {
            id: 99,
            args: vec![]
        }),
        Dispatch::Emit(Event::Error(ClientError::Protocol(_)))
    ));
}

#[test]
fn disconnect_fails_pending_calls() {
    let mut session = connected(false);
    let (sub_tx, mut sub_rx) = oneshot::channel();
    let (pub_tx, mut pub_rx) = oneshot::channel();
    session.subscribe(vec!["a".into()], sub_tx).unwrap();
    session
        .produce(&Message::new("a", "a", "x"), "k".into(), pub_tx)
        .unwrap();

    let previous = session.disconnected();
    assert_eq!(
        previous,
        ConnectionState::Connected(CommitState::Idle)
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        sub_rx.try_recv().unwrap(),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        pub_rx.try_recv().unwrap(),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(session.commit(), Err(ClientError::NotConnected)));
}

#[test]
fn error_packet_refuses_while_connecting() {
    let mut session = Session::new(true);
    session.begin_connecting();
    match session.handle(Packet::Error(json!("Not authorized"))) {
        Dispatch::Refused(ClientError::Connection(msg)) => assert_eq!(msg, "Not authorized"),
        other => panic!("Expected refusal, got {other:?}"),
    }

    let mut session = connected(true);
    assert!(matches!(
        session.handle(Packet::Error(json!("later"))),
        Dispatch::Emit(Event::Error(ClientError::Service(_)))
    ));
}

#[test]
fn service_events_and_keep_alive() {
    let mut session = connected(true);
    match session.handle(Packet::event("exception", vec![json!("broker unavailable")])) {
        Dispatch::Emit(Event::Exception(detail)) => assert_eq!(detail, "broker unavailable"),
        other => panic!("Expected exception, got {other:?}"),
    }
    assert!(matches!(
        session.handle(Packet::event("error", vec![json!("bad request")])),
        Dispatch::Emit(Event::Error(ClientError::Service(_)))
    ));
    assert!(matches!(
        session.handle(Packet::Ping),
        Dispatch::Reply(Packet::Pong)
    ));
    assert!(matches!(
        session.handle(Packet::event("something-new", vec![])),
        Dispatch::Nothing
    ));
    assert!(matches!(session.handle(Packet::Disconnect), Dispatch::Close));
}

#[test]
fn open_handshake_starts_pings() {
    let mut session = Session::new(true);
    session.begin_connecting();
    let handshake = crate::transport::Handshake {
        sid: "s".into(),
        upgrades: vec![],
        ping_interval: 25000,
        ping_timeout: 60000,
    };
    match session.handle(Packet::Open(handshake)) {
        Dispatch::Handshake(period) => assert_eq!(period.as_millis(), 25000),
        other => panic!("Expected handshake, got {other:?}"),
    }
}

#[test]
fn message_signature_travels_as_node_buffer() {
    let mut message = Message::new("topicA", "topicB", "Testing 1-2-3");
    message.headers.signature = Some(vec![1, 2, 3, 255]);
    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(
        value["headers"]["signature"],
        json!({"type": "Buffer", "data": [1, 2, 3, 255]})
    );

    let back: Message = serde_json::from_value(value).unwrap();
    assert_eq!(back, message);
}

#[test]
fn message_signature_accepts_base64_input() {
    let value = json!({
        "headers": {"from": "a", "to": "b", "signature": "AQID/w=="},
        "content": "x"
    });
    let message: Message = serde_json::from_value(value).unwrap();
    assert_eq!(message.headers.signature, Some(vec![1, 2, 3, 255]));
}

#[test]
fn message_signature_accepts_node_buffer_json() {
    let value = json!({
        "headers": {
            "from": "a",
            "to": "b",
            "signature": {"type": "Buffer", "data": [1, 2, 3]}
        },
        "content": "x"
    });
    let message: Message = serde_json::from_value(value).unwrap();
    assert_eq!(message.headers.signature, Some(vec![1, 2, 3]));
}

#[test]
fn message_without_signature_omits_the_field() {
    let value = serde_json::to_value(Message::new("a", "b", "c")).unwrap();
    assert_eq!(
        value,
        json!({"headers": {"from": "a", "to": "b"}, "content": "c"})
    );
    let back: Message = serde_json::from_value(value).unwrap();
    assert!(back.headers.signature.is_none());
}
