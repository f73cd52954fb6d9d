//! Direct conversation flows: lazy conversation resolution, the coin
//! tariff, delivery fan-out, read receipts, history paging, and
//! sender-only hard deletion.

mod common;

use common::{TestConn, TestWorld};
use salond::error::SessionError;
use salon_proto::{ClientRequest, ConversationId, MessageId, ServerEvent};
use std::time::Duration;

fn direct_send(peer: &str, text: &str) -> ClientRequest {
    ClientRequest::SendDirectMessage {
        peer_id: peer.into(),
        text: Some(text.to_string()),
        media_ref: None,
        kind: None,
    }
}

/// Pull a direct-message ack off the queue.
fn expect_ack(conn: &mut TestConn) -> (ConversationId, MessageId, Option<u64>, Option<i64>) {
    match conn.next_event() {
        ServerEvent::DirectMessage { seq, message, remaining_coins } => {
            (message.conversation_id, message.id, seq, remaining_coins)
        }
        other => panic!("expected direct-message, got {other:?}"),
    }
}

#[tokio::test]
async fn send_acks_sender_and_pushes_to_peer() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 10).await;
    let mut bob = world.user("bob", 10).await;

    world.send_ok(&alice, Some(7), direct_send("bob", "hi bob")).await;

    // Sender's ack carries the correlation id and the post-tariff balance.
    let (_, _, seq, remaining) = expect_ack(&mut alice);
    assert_eq!(seq, Some(7));
    assert_eq!(remaining, Some(8));
    assert!(alice.try_event().is_none());

    // Peer's push carries neither.
    let (_, _, seq, remaining) = expect_ack(&mut bob);
    assert_eq!(seq, None);
    assert_eq!(remaining, None);
}

#[tokio::test]
async fn conversation_resolution_is_order_insensitive() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 10).await;
    let mut bob = world.user("bob", 10).await;

    world.send_ok(&alice, Some(1), direct_send("bob", "first")).await;
    let (conv_a, _, _, _) = expect_ack(&mut alice);

    world.send_ok(&bob, Some(1), direct_send("alice", "second")).await;
    bob.drain();
    let events = alice.drain();
    let conv_b = match events.first() {
        Some(ServerEvent::DirectMessage { message, .. }) => message.conversation_id.clone(),
        other => panic!("expected direct-message push, got {other:?}"),
    };

    assert_eq!(conv_a, conv_b);
}

#[tokio::test]
async fn broke_sender_is_rejected_before_anything_is_stored() {
    let world = TestWorld::new().await;
    let carol = world.user("carol", 0).await;
    let mut bob = world.user("bob", 10).await;

    let err = world.dispatch(&carol, Some(1), direct_send("bob", "spare a coin")).await;
    assert!(matches!(err, Err(SessionError::PaymentRequired)));

    // Nothing reached the peer and the balance is untouched.
    assert!(bob.try_event().is_none());
    let account = world.state.accounts.find_user(&"carol".into()).await.unwrap().unwrap();
    assert_eq!(account.coins, 0);
}

#[tokio::test]
async fn last_coin_spends_below_zero_then_gates() {
    let world = TestWorld::new().await;
    let mut dave = world.user("dave", 1).await;
    world.user("bob", 10).await;

    // One coin against a tariff of two: the send goes through and the
    // balance lands negative.
    world.send_ok(&dave, Some(1), direct_send("bob", "going broke")).await;
    let (_, _, _, remaining) = expect_ack(&mut dave);
    assert_eq!(remaining, Some(-1));

    // The next send is gated.
    let err = world.dispatch(&dave, Some(2), direct_send("bob", "one more")).await;
    assert!(matches!(err, Err(SessionError::PaymentRequired)));
}

#[tokio::test]
async fn history_pages_oldest_first() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 20).await;
    let mut bob = world.user("bob", 20).await;

    let mut conv = None;
    for i in 0..3 {
        world.send_ok(&alice, None, direct_send("bob", &format!("m{i}"))).await;
        let (c, _, _, _) = expect_ack(&mut alice);
        conv = Some(c);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let conv = conv.unwrap();
    bob.drain();

    world
        .send_ok(
            &bob,
            Some(9),
            ClientRequest::GetDirectHistory { conversation_id: conv.clone(), limit: 2, skip: 0 },
        )
        .await;
    match bob.next_event() {
        ServerEvent::DirectHistory { seq, messages, has_more, .. } => {
            assert_eq!(seq, Some(9));
            assert!(has_more);
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].text.as_deref(), Some("m0"));
            assert_eq!(messages[1].text.as_deref(), Some("m1"));
        }
        other => panic!("expected direct-history, got {other:?}"),
    }

    world
        .send_ok(
            &bob,
            Some(10),
            ClientRequest::GetDirectHistory { conversation_id: conv, limit: 2, skip: 2 },
        )
        .await;
    match bob.next_event() {
        ServerEvent::DirectHistory { messages, has_more, .. } => {
            assert!(!has_more);
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].text.as_deref(), Some("m2"));
        }
        other => panic!("expected direct-history, got {other:?}"),
    }
}

#[tokio::test]
async fn history_is_for_participants_only() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 10).await;
    world.user("bob", 10).await;
    let carol = world.user("carol", 10).await;
    let oz = world.operator("oz").await;

    world.send_ok(&alice, Some(1), direct_send("bob", "private")).await;
    let (conv, _, _, _) = expect_ack(&mut alice);

    let err = world
        .dispatch(
            &carol,
            Some(2),
            ClientRequest::GetDirectHistory { conversation_id: conv.clone(), limit: 10, skip: 0 },
        )
        .await;
    assert!(matches!(err, Err(SessionError::Forbidden(_))));

    // Unlike group history, the operator role buys no access to a
    // conversation it is not part of.
    let err = world
        .dispatch(
            &oz,
            Some(3),
            ClientRequest::GetDirectHistory { conversation_id: conv.clone(), limit: 10, skip: 0 },
        )
        .await;
    assert!(matches!(err, Err(SessionError::Forbidden(_))));

    // A zero page size is a client error, not an empty page.
    let err = world
        .dispatch(
            &alice,
            Some(4),
            ClientRequest::GetDirectHistory { conversation_id: conv, limit: 0, skip: 0 },
        )
        .await;
    assert!(matches!(err, Err(SessionError::InvalidArgument(_))));
}

#[tokio::test]
async fn read_receipts_reach_the_sender_once() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 10).await;
    let mut bob = world.user("bob", 10).await;

    world.send_ok(&alice, None, direct_send("bob", "one")).await;
    world.send_ok(&alice, None, direct_send("bob", "two")).await;
    let (conv, _, _, _) = expect_ack(&mut alice);
    alice.drain();
    bob.drain();

    world
        .send_ok(&bob, Some(5), ClientRequest::MarkDirectRead { conversation_id: conv.clone() })
        .await;
    match bob.next_event() {
        ServerEvent::ReadReceipts { seq, message_ids, reader, .. } => {
            assert_eq!(seq, Some(5));
            assert_eq!(message_ids.len(), 2);
            assert_eq!(reader.as_str(), "bob");
        }
        other => panic!("expected read-receipts ack, got {other:?}"),
    }
    assert!(matches!(alice.next_event(), ServerEvent::ReadReceipts { seq: None, .. }));

    // Marking again finds nothing unread: the reader still gets an ack,
    // the sender hears nothing.
    world.send_ok(&bob, Some(6), ClientRequest::MarkDirectRead { conversation_id: conv }).await;
    assert!(
        matches!(bob.next_event(), ServerEvent::ReadReceipts { message_ids, .. } if message_ids.is_empty())
    );
    assert!(alice.try_event().is_none());
}

#[tokio::test]
async fn hard_delete_is_sender_only() {
    let world = TestWorld::new().await;
    let mut alice = world.user("alice", 10).await;
    let mut bob = world.user("bob", 10).await;

    world.send_ok(&alice, Some(1), direct_send("bob", "regret")).await;
    let (conv, msg, _, _) = expect_ack(&mut alice);
    bob.drain();

    let err = world
        .dispatch(
            &bob,
            Some(2),
            ClientRequest::HardDeleteMessage {
                group_id: None,
                conversation_id: Some(conv.clone()),
                message_id: msg.clone(),
            },
        )
        .await;
    assert!(matches!(err, Err(SessionError::Forbidden(_))));

    world
        .send_ok(
            &alice,
            Some(3),
            ClientRequest::HardDeleteMessage {
                group_id: None,
                conversation_id: Some(conv.clone()),
                message_id: msg.clone(),
            },
        )
        .await;
    assert!(
        matches!(alice.next_event(), ServerEvent::MessageDeleted { seq: Some(3), hard: true, .. })
    );
    assert!(matches!(bob.next_event(), ServerEvent::MessageDeleted { seq: None, hard: true, .. }));

    // Gone for good.
    world
        .send_ok(
            &alice,
            Some(4),
            ClientRequest::GetDirectHistory { conversation_id: conv, limit: 10, skip: 0 },
        )
        .await;
    assert!(
        matches!(alice.next_event(), ServerEvent::DirectHistory { messages, .. } if messages.is_empty())
    );
}

#[tokio::test]
async fn every_device_of_the_sender_sees_the_send() {
    let world = TestWorld::new().await;
    let mut alice_phone = world.user("alice", 10).await;
    let mut alice_laptop = world.connect("alice", salon_proto::Role::User);
    world.user("bob", 10).await;

    world.send_ok(&alice_phone, Some(1), direct_send("bob", "synced")).await;

    // The requesting device gets the ack; the other device gets the
    // plain push so its timeline stays current.
    assert!(
        matches!(alice_phone.next_event(), ServerEvent::DirectMessage { seq: Some(1), .. })
    );
    assert!(matches!(
        alice_laptop.next_event(),
        ServerEvent::DirectMessage { seq: None, remaining_coins: None, .. }
    ));
}
