//! Room negotiation: one host, many joiners, isolated sub-trees

mod harness;

use std::sync::Arc;
use std::time::Duration;

use peerlink_core::{MemoryStore, SignalingStore};
use peerlink_webrtc::signaling::{JoinRequest, RoomPaths, SessionDescription};
use peerlink_webrtc::{ConnectionCoordinator, Error, SessionRole, SessionState};
use serde_json::json;

use harness::{
    candidate, init_tracing, link_and_open, recv_message, test_config, wait_for_room_session,
    wait_for_state, wait_until, MockTransportFactory, WAIT,
};

fn coordinator(
    store: &MemoryStore,
    factory: &Arc<MockTransportFactory>,
    identity: &str,
) -> ConnectionCoordinator {
    ConnectionCoordinator::new(
        Arc::new(store.clone()),
        factory.clone(),
        test_config(),
        identity,
    )
    .unwrap()
}

#[tokio::test]
async fn room_join_answer_and_message() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    let host = coordinator(&store, &factory, "host");
    let p1 = coordinator(&store, &factory, "p1");

    let room = host.create_room().await.unwrap();
    let joiner_session = p1.join_room(room.room_id()).await.unwrap();
    assert_eq!(joiner_session.role(), SessionRole::Joiner);

    // The host answers the join request with a session keyed by identity.
    wait_until(WAIT, || factory.count() >= 2).await;
    let host_session = wait_for_room_session(&room, "p1").await;
    assert_eq!(host_session.role(), SessionRole::Host);
    assert_eq!(host_session.remote_id(), "p1");

    let joiner_transport = factory.transport(0);
    let host_transport = factory.transport(1);

    // Joiner observes the answer and applies it exactly once.
    wait_until(WAIT, || joiner_transport.remote_set_count() == 1).await;
    assert_eq!(
        joiner_transport.remote_description_snapshot().unwrap(),
        host_transport.local_description().unwrap()
    );
    assert_eq!(
        host_transport.remote_description_snapshot().unwrap(),
        joiner_transport.local_description().unwrap()
    );

    let mut host_messages = host_session.take_messages().unwrap();
    link_and_open(&joiner_transport, &host_transport);
    wait_for_state(&joiner_session, SessionState::Open).await;
    wait_for_state(&host_session, SessionState::Open).await;

    joiner_session.send("hello").await.unwrap();
    assert_eq!(recv_message(&mut host_messages).await, "hello");
}

#[tokio::test]
async fn join_unknown_room_yields_not_found_and_no_session() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();
    let p1 = coordinator(&store, &factory, "p1");

    let err = p1.join_room("missing").await.unwrap_err();
    assert!(matches!(err, Error::NegotiationNotFound(_)));
    assert_eq!(factory.count(), 0);
}

#[tokio::test]
async fn broadcast_reaches_open_sessions_and_skips_negotiating_ones() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    let host = coordinator(&store, &factory, "host");
    let room = host.create_room().await.unwrap();

    // p1 and p2 complete negotiation and open; p3 stays negotiating.
    let p1 = coordinator(&store, &factory, "p1");
    let p1_session = p1.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 2).await;

    let p2 = coordinator(&store, &factory, "p2");
    let p2_session = p2.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 4).await;

    let p3 = coordinator(&store, &factory, "p3");
    let _p3_session = p3.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 6).await;
    let host_p3 = wait_for_room_session(&room, "p3").await;

    let host_p1 = wait_for_room_session(&room, "p1").await;
    let host_p2 = wait_for_room_session(&room, "p2").await;

    let mut p1_messages = p1_session.take_messages().unwrap();
    let mut p2_messages = p2_session.take_messages().unwrap();

    link_and_open(&factory.transport(0), &factory.transport(1));
    link_and_open(&factory.transport(2), &factory.transport(3));
    wait_for_state(&p1_session, SessionState::Open).await;
    wait_for_state(&p2_session, SessionState::Open).await;
    wait_for_state(&host_p1, SessionState::Open).await;
    wait_for_state(&host_p2, SessionState::Open).await;

    assert_eq!(host_p3.state(), SessionState::Negotiating);

    let reached = room.broadcast("round one").await;
    assert_eq!(reached, 2);
    assert_eq!(recv_message(&mut p1_messages).await, "round one");
    assert_eq!(recv_message(&mut p2_messages).await, "round one");

    // Targeted sends follow the same state rule.
    room.send_to("p1", "just you").await.unwrap();
    assert_eq!(recv_message(&mut p1_messages).await, "just you");
    let err = room.send_to("p3", "not yet").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let err = room.send_to("p9", "nobody").await.unwrap_err();
    assert!(matches!(err, Error::PeerNotFound(_)));
}

#[tokio::test]
async fn joiners_only_observe_their_own_subtree() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    let host = coordinator(&store, &factory, "host");
    let room = host.create_room().await.unwrap();

    let p1 = coordinator(&store, &factory, "p1");
    let _p1_session = p1.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 2).await;

    let p2 = coordinator(&store, &factory, "p2");
    let _p2_session = p2.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 4).await;

    let p1_transport = factory.transport(0);
    let host_for_p1 = factory.transport(1);
    let p2_transport = factory.transport(2);
    let host_for_p2 = factory.transport(3);
    wait_until(WAIT, || p1_transport.remote_set_count() == 1).await;
    wait_until(WAIT, || p2_transport.remote_set_count() == 1).await;

    // A candidate discovered by p1 reaches the host session for p1 only.
    p1_transport.discover_candidate("from-p1");
    wait_until(WAIT, || host_for_p1.applied_candidates().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(host_for_p2.applied_candidates().is_empty());
    assert!(p2_transport.applied_candidates().is_empty());

    // And it was stored under p1's sub-tree, never anywhere else.
    let paths = RoomPaths::new(room.room_id());
    let p1_prefix = format!("{}/", paths.player("p1").offer_candidates().as_str());
    let p2_prefix = format!("{}/", paths.player("p2").offer_candidates().as_str());
    let stored: Vec<String> = store.document_paths();
    assert!(stored.iter().any(|path| path.starts_with(&p1_prefix)));
    assert!(!stored
        .iter()
        .any(|path| path.starts_with(&p2_prefix)));
}

#[tokio::test]
async fn duplicate_join_requests_spawn_one_session() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    let host = coordinator(&store, &factory, "host");
    let room = host.create_room().await.unwrap();

    let p1 = coordinator(&store, &factory, "p1");
    let _p1_session = p1.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 2).await;

    // The same join request delivered again (store replay) and a second
    // request for the same identity must both be ignored.
    let paths = RoomPaths::new(room.room_id());
    store.replay_collection(&paths.requests());
    let duplicate = JoinRequest {
        offer: SessionDescription::offer("v=0 duplicate"),
        player_id: "p1".to_string(),
    };
    store
        .create_document(&paths.requests(), serde_json::to_value(&duplicate).unwrap())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(room.session_count().await, 1);
    assert_eq!(factory.count(), 2);
}

#[tokio::test]
async fn early_candidates_are_buffered_until_the_answer_arrives() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    // Room exists, but there is no live host: the test plays the host's
    // side directly against the store to control timing.
    let paths = RoomPaths::new("r-test");
    store
        .set_document(&paths.document, json!({}))
        .await
        .unwrap();

    let p1 = coordinator(&store, &factory, "p1");
    let _p1_session = p1.join_room("r-test").await.unwrap();
    wait_until(WAIT, || factory.count() >= 1).await;
    let p1_transport = factory.transport(0);

    // A host candidate lands before the answer.
    let joiner = paths.player("p1");
    store
        .create_document(
            &joiner.answer_candidates(),
            serde_json::to_value(candidate("early")).unwrap(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(p1_transport.applied_candidates().is_empty());
    assert_eq!(p1_transport.early_candidate_errors(), 0);

    // Once the answer arrives the buffered candidate is flushed, once.
    store
        .create_document(
            &joiner.responses(),
            json!({"answer": {"type": "answer", "sdp": "v=0 host"}}),
        )
        .await
        .unwrap();

    wait_until(WAIT, || p1_transport.applied_candidates().len() == 1).await;
    assert!(p1_transport.applied_candidates()[0]
        .candidate
        .contains("early"));
    assert_eq!(p1_transport.early_candidate_errors(), 0);
    assert_eq!(p1_transport.remote_set_count(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(p1_transport.applied_candidates().len(), 1);
}

#[tokio::test]
async fn one_joiner_failure_does_not_affect_others() {
    init_tracing();
    let store = MemoryStore::new();
    let factory = MockTransportFactory::new();

    let host = coordinator(&store, &factory, "host");
    let room = host.create_room().await.unwrap();

    // A malformed join request (no offer) is ignored outright.
    let paths = RoomPaths::new(room.room_id());
    store
        .create_document(&paths.requests(), json!({"playerID": "broken"}))
        .await
        .unwrap();

    // A healthy joiner still negotiates.
    let p1 = coordinator(&store, &factory, "p1");
    let p1_session = p1.join_room(room.room_id()).await.unwrap();
    wait_until(WAIT, || factory.count() >= 2).await;
    wait_until(WAIT, || {
        factory.transport(0).remote_set_count() == 1
    })
    .await;

    assert!(room.session("broken").await.is_none());
    assert!(room.session("p1").await.is_some());
    assert_eq!(p1_session.state(), SessionState::Negotiating);
}
