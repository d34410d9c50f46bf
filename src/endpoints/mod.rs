use std::time::Duration;

use hyper::{Body, Request, Response};
use tracing::debug;

use crate::server::ConnectionInfo;
use crate::utils::*;

mod hello;
mod not_found;
mod ws;

pub use hello::hello;
pub use not_found::not_found;
pub use ws::handle_ws;

pub async fn request_router(req: Request<Body>, ws_timeout: Duration) -> Response<Body> {
    let info = req.extensions().get::<ConnectionInfo>().cloned();
    debug!(
        method = %req.method(),
        uri = %req.uri(),
        secure = ?info.as_ref().map(|info| info.secure),
        "request"
    );
    if req.uri().path() == "/ws" {
        return handle_ws(req, ws_timeout).await;
    }
    let mut response = match req.uri().path() {
        "/" => hello(info.as_ref()),
        _ => not_found(),
    };
    apply_cors(&mut response);
    apply_content_type(&mut response);
    response
}
