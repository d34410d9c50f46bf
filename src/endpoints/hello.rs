use hyper::{Body, Response};

use crate::server::ConnectionInfo;

pub fn hello(info: Option<&ConnectionInfo>) -> Response<Body> {
    let secure = info.map_or(false, |info| info.secure);
    let scheme = if secure { "https" } else { "http" };
    Response::new(Body::from(format!("Hello from hyper over {}!", scheme)))
}
