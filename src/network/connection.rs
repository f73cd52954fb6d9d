//! Per-connection lifecycle: handshake, event loop, cleanup.
//!
//! Phase 1 binds an identity: the first frame must be `authenticate`
//! and must arrive within the handshake timeout, or the connection is
//! closed. Phase 2 is the unified event loop: framed reads are
//! dispatched through the handler registry, the outbound queue is
//! drained to the socket, and flood violations accumulate toward a
//! disconnect. Cleanup needs no client cooperation.

use crate::auth::Identity;
use crate::handlers::{Context, Registry};
use crate::state::{ConnHandle, ConnId, SessionState};
use crate::telemetry::{RequestTimer, spans};
use futures_util::{SinkExt, StreamExt};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use salon_proto::{ClientRequest, Decoded, RequestFrame, ServerCodec, ServerEvent};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, info, warn};

/// How long an unauthenticated connection may sit before it is closed.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

/// Run one connection to completion.
pub async fn run(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<SessionState>,
    handlers: Arc<Registry>,
) {
    let conn_id = ConnId::next();
    let span = spans::connection(&conn_id.to_string(), &addr.ip().to_string());

    async {
        let mut framed = Framed::new(stream, ServerCodec::new());

        let Some(identity) = handshake(&mut framed, &state).await else {
            return;
        };
        info!(user = %identity.user_id, role = identity.role.as_str(), "Authenticated");

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        state.registry.register(ConnHandle {
            conn_id,
            user_id: identity.user_id.clone(),
            role: identity.role,
            tx,
        });
        if let Some(g) = crate::metrics::CONNECTED_CLIENTS.get() {
            g.inc();
        }

        event_loop(&mut framed, rx, conn_id, &identity, &state, &handlers).await;

        // Transport is gone; unwind every trace of the connection.
        state.registry.unregister(conn_id);
        let left_rooms = state.rosters.drop_conn(conn_id);
        if let Some(g) = crate::metrics::CONNECTED_CLIENTS.get() {
            g.dec();
        }
        info!(user = %identity.user_id, rooms = left_rooms.len(), "Disconnected");
    }
    .instrument(span)
    .await
}

/// Phase 1: require `authenticate` as the first frame.
async fn handshake(
    framed: &mut Framed<TcpStream, ServerCodec>,
    state: &SessionState,
) -> Option<Identity> {
    let first = match tokio::time::timeout(AUTH_TIMEOUT, framed.next()).await {
        Ok(Some(Ok(Decoded::Frame(frame)))) => frame,
        Ok(Some(Ok(Decoded::Malformed(e)))) => {
            crate::metrics::record_auth_failure();
            let envelope =
                ServerEvent::error("unauthenticated", "malformed handshake frame", None, None);
            let _ = framed.send(&envelope).await;
            debug!(error = %e, "Handshake frame unreadable");
            return None;
        }
        Ok(Some(Err(e))) => {
            debug!(error = %e, "Transport error during handshake");
            return None;
        }
        Ok(None) => return None,
        Err(_) => {
            debug!("Handshake timeout");
            return None;
        }
    };

    let ClientRequest::Authenticate { token } = &first.request else {
        crate::metrics::record_auth_failure();
        let envelope =
            ServerEvent::error("unauthenticated", "authenticate first", None, first.seq);
        let _ = framed.send(&envelope).await;
        return None;
    };

    match state.verifier.verify(token.as_str()) {
        Ok(identity) => {
            let welcome = ServerEvent::Welcome {
                user_id: identity.user_id.clone(),
                role: identity.role,
            };
            if framed.send(&welcome).await.is_err() {
                return None;
            }
            Some(identity)
        }
        Err(e) => {
            crate::metrics::record_auth_failure();
            let _ = framed.send(&e.to_envelope(first.seq)).await;
            None
        }
    }
}

/// Phase 2: the unified event loop.
async fn event_loop(
    framed: &mut Framed<TcpStream, ServerCodec>,
    mut rx: mpsc::Receiver<ServerEvent>,
    conn_id: ConnId,
    identity: &Identity,
    state: &Arc<SessionState>,
    handlers: &Registry,
) {
    let rate = NonZeroU32::new(state.config.limits.message_rate_per_second)
        .unwrap_or(nonzero!(20u32));
    let limiter = RateLimiter::direct(Quota::per_second(rate));
    let max_violations = state.config.limits.max_flood_violations;
    let mut flood_violations = 0u8;

    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(Decoded::Frame(frame))) => {
                        if limiter.check().is_ok() {
                            flood_violations = 0;
                        } else {
                            flood_violations += 1;
                            crate::metrics::record_flood_violation();
                            warn!(user = %identity.user_id, violations = flood_violations, "Rate limit exceeded");
                            let warning = ServerEvent::FloodWarning {
                                violations: flood_violations,
                                max_violations,
                            };
                            if framed.send(&warning).await.is_err() || flood_violations >= max_violations {
                                break;
                            }
                            continue;
                        }

                        dispatch(frame, conn_id, identity, state, handlers).await;
                    }
                    Some(Ok(Decoded::Malformed(e))) => {
                        let envelope = ServerEvent::error(
                            "invalid_argument",
                            "malformed frame",
                            Some(e.to_string()),
                            None,
                        );
                        if framed.send(&envelope).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "Transport error");
                        break;
                    }
                    None => {
                        debug!("Client disconnected");
                        break;
                    }
                }
            }

            Some(event) = rx.recv() => {
                if framed.send(&event).await.is_err() {
                    warn!("Write error");
                    break;
                }
            }
        }
    }
}

/// Route one frame through the handler registry; failures become error
/// envelopes on this connection's queue.
async fn dispatch(
    frame: RequestFrame,
    conn_id: ConnId,
    identity: &Identity,
    state: &Arc<SessionState>,
    handlers: &Registry,
) {
    let op = frame.request.op_name();
    let ctx = Context { conn_id, identity, state, seq: frame.seq };

    if matches!(frame.request, ClientRequest::Authenticate { .. }) {
        ctx.reply(ServerEvent::error(
            "conflict",
            "already authenticated",
            None,
            frame.seq,
        ));
        return;
    }

    let _timer = RequestTimer::new(op);
    let span = spans::request(op, identity.user_id.as_str());
    if let Err(e) = handlers.dispatch(&ctx, &frame.request).instrument(span).await {
        crate::metrics::record_request_error(op, e.error_code());
        debug!(op, code = e.error_code(), error = %e, "Request failed");
        ctx.reply(e.to_envelope(frame.seq));
    }
}
