use std::sync::{Arc, Mutex};

use hyper::{Body, Method, Request, Response};
use tracing::{debug, info, warn, Instrument, Span};

use super::handler::Handler;
use crate::config::ListenerState;
use crate::ws::handshake::{is_upgrade_request, negotiate};
use crate::ws::WebSocket;

/// Request extension holding the upgraded connection until the handler takes it.
///
/// Its presence also marks the exchange as already upgraded.
pub struct WebSocketSlot(Mutex<Option<WebSocket>>);

impl WebSocketSlot {
    fn new(ws: WebSocket) -> Self {
        WebSocketSlot(Mutex::new(Some(ws)))
    }

    fn take(&self) -> Option<WebSocket> {
        self.0.lock().ok()?.take()
    }
}

/// Moves the upgraded connection out of the request, if there is one.
pub fn take_websocket(req: &mut Request<Body>) -> Option<WebSocket> {
    req.extensions().get::<WebSocketSlot>()?.take()
}

fn wants_upgrade(req: &Request<Body>) -> bool {
    req.method() == Method::GET
        && req.extensions().get::<WebSocketSlot>().is_none()
        && is_upgrade_request(req.headers())
}

/// Runs between hyper and the application handler.
///
/// Ordinary requests go straight through. Upgrade requests are negotiated
/// here: a rejection is answered without calling the handler, an acceptance
/// answers 101 and calls the handler once the socket has been handed over.
pub async fn intercept<H: Handler>(
    mut req: Request<Body>,
    state: Arc<ListenerState>,
    handler: Arc<H>,
) -> Response<Body> {
    if !wants_upgrade(&req) {
        return handler.call(req).await;
    }

    let accepted = match negotiate(req.headers(), &state.websocket) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            info!(
                status = %rejection.status,
                reason = rejection.reason,
                "websocket handshake rejected"
            );
            return rejection.into_response();
        }
    };
    debug!(
        version = %accepted.version,
        protocols = ?accepted.protocols,
        compression = accepted.compression,
        "websocket handshake accepted"
    );

    let response = accepted.response();
    // resolves after hyper has flushed the 101 response
    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(
        async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    warn!("websocket upgrade failed: {}", e);
                    return;
                }
            };
            let ws = WebSocket::new(upgraded, accepted.compression, &state.websocket);
            req.extensions_mut().insert(WebSocketSlot::new(ws));
            req.extensions_mut().insert(accepted);
            // the socket belongs to the websocket now, nothing is written back
            let _discarded = handler.call(req).await;
            debug!("websocket handler returned");
        }
        .instrument(Span::current()),
    );
    response
}
