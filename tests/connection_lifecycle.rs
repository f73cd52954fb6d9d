//! End-to-end connection lifecycle over a real socket: handshake,
//! credential rejection, re-authentication, and state cleanup after
//! disconnect.

mod common;

use common::TestWorld;
use futures_util::{SinkExt, StreamExt};
use salond::auth::TokenClaims;
use salond::network::Gateway;
use salon_proto::{
    ClientCodec, ClientRequest, Decoded, GroupVisibility, RequestFrame, Role, ServerEvent,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, ClientCodec>;

async fn start(world: &TestWorld) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Gateway::new(Arc::clone(&world.state));
    tokio::spawn(async move {
        let _ = gateway.serve(listener).await;
    });
    addr
}

async fn client(addr: SocketAddr) -> Client {
    Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new())
}

fn token_for(world: &TestWorld, user: &str) -> String {
    world.state.verifier.mint(&TokenClaims {
        sub: user.to_string(),
        role: Role::User,
        exp: chrono::Utc::now().timestamp() + 3600,
    })
}

/// Read the next event, failing the test on transport loss or an
/// unparseable server frame.
async fn next_event(cli: &mut Client) -> ServerEvent {
    match cli.next().await.expect("server closed the connection").unwrap() {
        Decoded::Frame(event) => event,
        Decoded::Malformed(e) => panic!("server wrote an unparseable frame: {e}"),
    }
}

async fn authenticate(cli: &mut Client, token: String) -> ServerEvent {
    cli.send(&RequestFrame { seq: Some(1), request: ClientRequest::Authenticate { token } })
        .await
        .unwrap();
    next_event(cli).await
}

/// Poll until `check` holds or a few seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

#[tokio::test]
async fn handshake_binds_identity_and_disconnect_unregisters() {
    let world = TestWorld::new().await;
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    let token = token_for(&world, "alice");
    match authenticate(&mut cli, token).await {
        ServerEvent::Welcome { user_id, role } => {
            assert_eq!(user_id.as_str(), "alice");
            assert_eq!(role, Role::User);
        }
        other => panic!("expected welcome, got {other:?}"),
    }
    eventually(|| world.state.registry.len() == 1).await;

    drop(cli);
    eventually(|| world.state.registry.is_empty()).await;
}

#[tokio::test]
async fn forged_tokens_are_rejected_and_the_connection_closes() {
    let world = TestWorld::new().await;
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    match authenticate(&mut cli, "not-a-token".into()).await {
        ServerEvent::Error { body } => {
            assert_eq!(body.code, "unauthenticated");
            assert_eq!(body.seq, Some(1));
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert!(cli.next().await.is_none());
    assert!(world.state.registry.is_empty());
}

#[tokio::test]
async fn first_frame_must_be_authenticate() {
    let world = TestWorld::new().await;
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    cli.send(&RequestFrame {
        seq: Some(4),
        request: ClientRequest::JoinGroup { group_id: "g1".into() },
    })
    .await
    .unwrap();

    match next_event(&mut cli).await {
        ServerEvent::Error { body } => {
            assert_eq!(body.code, "unauthenticated");
            assert_eq!(body.seq, Some(4));
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert!(cli.next().await.is_none());
}

#[tokio::test]
async fn re_authentication_is_a_conflict() {
    let world = TestWorld::new().await;
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    let token = token_for(&world, "alice");
    assert!(matches!(
        authenticate(&mut cli, token.clone()).await,
        ServerEvent::Welcome { .. }
    ));

    cli.send(&RequestFrame { seq: Some(2), request: ClientRequest::Authenticate { token } })
        .await
        .unwrap();
    match next_event(&mut cli).await {
        ServerEvent::Error { body } => {
            assert_eq!(body.code, "conflict");
            assert_eq!(body.seq, Some(2));
        }
        other => panic!("expected conflict envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_get_an_envelope_and_the_connection_survives() {
    let world = TestWorld::new().await;
    world.state.db.accounts().ensure(&"alice".into(), Role::User, 10).await.unwrap();
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    let token = token_for(&world, "alice");
    assert!(matches!(authenticate(&mut cli, token).await, ServerEvent::Welcome { .. }));

    // A line that is not JSON must be answered, not fatal.
    cli.get_mut().write_all(b"this is not json\n").await.unwrap();
    match next_event(&mut cli).await {
        ServerEvent::Error { body } => assert_eq!(body.code, "invalid_argument"),
        other => panic!("expected error envelope, got {other:?}"),
    }

    // The stream is still being read: a well-formed request after the
    // garbage gets its ack.
    cli.send(&RequestFrame {
        seq: Some(3),
        request: ClientRequest::CreateGroup {
            name: "still here".into(),
            visibility: GroupVisibility::Public,
            description: None,
            rules: None,
            tags: Vec::new(),
            image: None,
        },
    })
    .await
    .unwrap();
    match next_event(&mut cli).await {
        ServerEvent::GroupCreated { seq: Some(3), .. } => {}
        other => panic!("expected group-created ack, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_clears_the_rooms_too() {
    let world = TestWorld::new().await;
    world.state.db.accounts().ensure(&"alice".into(), Role::User, 10).await.unwrap();
    let addr = start(&world).await;

    let mut cli = client(addr).await;
    let token = token_for(&world, "alice");
    assert!(matches!(authenticate(&mut cli, token).await, ServerEvent::Welcome { .. }));

    cli.send(&RequestFrame {
        seq: Some(2),
        request: ClientRequest::CreateGroup {
            name: "pop-up room".into(),
            visibility: GroupVisibility::Public,
            description: None,
            rules: None,
            tags: Vec::new(),
            image: None,
        },
    })
    .await
    .unwrap();

    let group_id = match next_event(&mut cli).await {
        ServerEvent::GroupCreated { seq: Some(2), group } => group.id,
        other => panic!("expected group-created ack, got {other:?}"),
    };
    assert_eq!(world.state.rosters.conns_in(&group_id).len(), 1);

    drop(cli);
    eventually(|| {
        world.state.registry.is_empty() && world.state.rosters.conns_in(&group_id).is_empty()
    })
    .await;
}
