use std::collections::BTreeSet;

use hyper::header::{HeaderMap, HeaderValue, CONNECTION, UPGRADE};
use hyper::{Body, Response, StatusCode};
use sha1::{Digest, Sha1};
use tracing::debug;

use super::consts::{SUPPORTED_VERSIONS, WS_MAGIC_CONST};
use crate::config::WebSocketConfig;

pub const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
pub const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";
pub const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
pub const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";
pub const SEC_WEBSOCKET_EXTENSIONS: &str = "sec-websocket-extensions";

fn sha1(msg: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(msg);
    hasher.finalize().into()
}

pub fn generate_key_from(input: &[u8]) -> String {
    let concatenated = [input, WS_MAGIC_CONST].concat();
    let hash = sha1(&concatenated);
    base64::encode(hash)
}

/// A successful negotiation: the 101 headers plus what the connection needs.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub version: String,
    pub accept_key: String,
    pub protocols: Vec<String>,
    pub compression: bool,
    pub headers: HeaderMap,
}

impl Accepted {
    pub fn response(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub reason: &'static str,
}

impl Rejection {
    fn new(status: StatusCode, reason: &'static str) -> Self {
        Rejection {
            status,
            headers: HeaderMap::new(),
            reason,
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.reason));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

fn comma_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// True when `Upgrade` names websocket or `Connection` carries the upgrade token.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let upgrade = header_str(headers, UPGRADE.as_str());
    let connection = header_str(headers, CONNECTION.as_str());
    upgrade.eq_ignore_ascii_case("websocket")
        || comma_list(connection).any(|token| token.eq_ignore_ascii_case("upgrade"))
}

/// Validates an opening handshake and builds the 101 response headers.
pub fn negotiate(headers: &HeaderMap, config: &WebSocketConfig) -> Result<Accepted, Rejection> {
    let version = header_str(headers, SEC_WEBSOCKET_VERSION);
    if !SUPPORTED_VERSIONS.contains(&version) {
        let status = if version.is_empty() {
            StatusCode::UPGRADE_REQUIRED
        } else {
            StatusCode::BAD_REQUEST
        };
        let mut rejection = Rejection::new(status, "Invalid Sec-Websocket-Version");
        rejection.headers.insert(
            SEC_WEBSOCKET_VERSION,
            HeaderValue::from_static("13, 8, 7"),
        );
        debug!(version, %status, "rejecting websocket version");
        return Err(rejection);
    }

    let key = header_str(headers, SEC_WEBSOCKET_KEY);
    match base64::decode(key) {
        Ok(decoded) if decoded.len() == 16 => {}
        _ => {
            debug!(key, "rejecting websocket key");
            return Err(Rejection::new(
                StatusCode::BAD_REQUEST,
                "Invalid Sec-Websocket-Key",
            ));
        }
    }
    let accept_key = generate_key_from(key.as_bytes());

    let requested: BTreeSet<&str> =
        comma_list(header_str(headers, SEC_WEBSOCKET_PROTOCOL)).collect();
    let protocols: Vec<String> = if config.protocols.is_empty() {
        requested.iter().map(|p| p.to_string()).collect()
    } else {
        config
            .protocols
            .iter()
            .filter(|p| requested.contains(p.as_str()))
            .cloned()
            .collect()
    };

    let compression = comma_list(header_str(headers, SEC_WEBSOCKET_EXTENSIONS))
        .filter_map(|extension| extension.split(';').next())
        .any(|name| name.trim().eq_ignore_ascii_case(&config.compression_token));

    let mut response_headers = HeaderMap::new();
    response_headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    response_headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    response_headers.insert(SEC_WEBSOCKET_ACCEPT, header_value(&accept_key)?);
    if !protocols.is_empty() {
        response_headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            header_value(&protocols.join(", "))?,
        );
    }
    if compression {
        response_headers.insert(
            SEC_WEBSOCKET_EXTENSIONS,
            header_value(&config.compression_token)?,
        );
    }

    Ok(Accepted {
        version: version.to_string(),
        accept_key,
        protocols,
        compression,
        headers: response_headers,
    })
}

fn header_value(value: &str) -> Result<HeaderValue, Rejection> {
    HeaderValue::from_str(value)
        .map_err(|_| Rejection::new(StatusCode::BAD_REQUEST, "Invalid Sec-Websocket-Protocol"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(name, value) in pairs {
            headers.insert(name, HeaderValue::from_static(value));
        }
        headers
    }

    fn valid(extra: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut pairs = vec![
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-version", "13"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
        ];
        pairs.extend_from_slice(extra);
        request(&pairs)
    }

    #[test]
    fn rfc6455_accept_key() {
        assert_eq!(
            generate_key_from(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn accepts_a_plain_upgrade() {
        let accepted = negotiate(&valid(&[]), &WebSocketConfig::default()).unwrap();
        assert_eq!(accepted.accept_key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(!accepted.compression);
        assert!(accepted.protocols.is_empty());

        let response = accepted.response();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()["upgrade"], "websocket");
        assert_eq!(response.headers()["connection"], "Upgrade");
        assert_eq!(
            response.headers()["sec-websocket-accept"],
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert!(response.headers().get("sec-websocket-extensions").is_none());
    }

    #[test]
    fn missing_version_is_426() {
        let headers = request(&[("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")]);
        let rejection = negotiate(&headers, &WebSocketConfig::default()).unwrap_err();
        assert_eq!(rejection.status, StatusCode::UPGRADE_REQUIRED);
        assert_eq!(rejection.headers["sec-websocket-version"], "13, 8, 7");
    }

    #[test]
    fn unsupported_version_is_400() {
        let headers = request(&[
            ("sec-websocket-version", "99"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
        ]);
        let rejection = negotiate(&headers, &WebSocketConfig::default()).unwrap_err();
        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn older_drafts_are_accepted() {
        for version in ["8", "7"] {
            let mut headers = valid(&[]);
            headers.insert("sec-websocket-version", HeaderValue::from_static(version));
            assert_eq!(
                negotiate(&headers, &WebSocketConfig::default()).unwrap().version,
                version
            );
        }
    }

    #[test]
    fn bad_keys_are_400() {
        for key in ["", "not base64!", "c2hvcnQ="] {
            let mut headers = valid(&[]);
            headers.insert("sec-websocket-key", HeaderValue::from_static(key));
            let rejection = negotiate(&headers, &WebSocketConfig::default()).unwrap_err();
            assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
            assert_eq!(rejection.reason, "Invalid Sec-Websocket-Key");
        }
    }

    #[test]
    fn echoes_supported_protocols_only() {
        let config = WebSocketConfig {
            protocols: vec!["json".into(), "chat".into()],
            ..WebSocketConfig::default()
        };
        let headers = valid(&[("sec-websocket-protocol", "chat, mqtt ,json")]);
        let accepted = negotiate(&headers, &config).unwrap();
        assert_eq!(accepted.protocols, vec!["json", "chat"]);
        assert_eq!(accepted.headers["sec-websocket-protocol"], "json, chat");

        let headers = valid(&[("sec-websocket-protocol", "mqtt")]);
        let accepted = negotiate(&headers, &config).unwrap();
        assert!(accepted.headers.get("sec-websocket-protocol").is_none());
    }

    #[test]
    fn echoes_requested_protocols_without_server_list() {
        let headers = valid(&[("sec-websocket-protocol", "b, a")]);
        let accepted = negotiate(&headers, &WebSocketConfig::default()).unwrap();
        assert_eq!(accepted.headers["sec-websocket-protocol"], "a, b");
    }

    #[test]
    fn negotiates_permessage_deflate() {
        let headers = valid(&[(
            "sec-websocket-extensions",
            "permessage-deflate; client_max_window_bits, x-webkit-deflate-frame",
        )]);
        let accepted = negotiate(&headers, &WebSocketConfig::default()).unwrap();
        assert!(accepted.compression);
        assert_eq!(accepted.headers["sec-websocket-extensions"], "permessage-deflate");
    }

    #[test]
    fn detects_upgrade_requests() {
        assert!(is_upgrade_request(&request(&[("upgrade", "WebSocket")])));
        assert!(is_upgrade_request(&request(&[("connection", "keep-alive, Upgrade")])));
        assert!(!is_upgrade_request(&request(&[("connection", "keep-alive")])));
    }
}
