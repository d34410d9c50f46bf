use std::future::Future;

use futures::future::BoxFuture;
use hyper::{Body, Request, Response};

/// The application side of the server: one request in, one response out.
///
/// After a WebSocket upgrade the handler is still called, with the
/// connection waiting in the request extensions (see
/// [`take_websocket`](super::take_websocket)); its response is discarded.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin(self(req))
    }
}
