use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hyper::{Body, Request, Response};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_rustls::TlsConnector;

use hyper_ws_mux::config::{ListenerState, WebSocketConfig};
use hyper_ws_mux::endpoints::request_router;
use hyper_ws_mux::server::{serve, ConnectionInfo};
use hyper_ws_mux::tls::{load_acceptor, load_certs};
use hyper_ws_mux::ws::deflate::Deflate;
use hyper_ws_mux::ws::{encode_frame, read_frame, Frame, Opcode, ReadOptions};

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

struct Server {
    addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

async fn start(tls: bool) -> Server {
    let acceptor = if tls {
        let certfile = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/server.pem");
        Some(load_acceptor(&certfile, None).unwrap())
    } else {
        None
    };
    let state = Arc::new(ListenerState::new(WebSocketConfig::default(), acceptor));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let handler = |req: Request<Body>| async move {
        if req.uri().path() == "/secure" {
            let secure = req
                .extensions()
                .get::<ConnectionInfo>()
                .map(|info| info.secure);
            return Response::new(Body::from(format!("secure={:?}", secure)));
        }
        request_router(req, Duration::from_millis(100)).await
    };
    tokio::spawn(serve(listener, state, handler, async {
        let _ = stopped.await;
    }));
    Server { addr, _stop: stop }
}

async fn send_request<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, path: &str) -> String {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

// reads the response head byte by byte so no frame bytes are consumed
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await.unwrap());
    }
    String::from_utf8(head).unwrap()
}

async fn upgrade(addr: SocketAddr, extra: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {}\r\n{}\r\n",
        KEY, extra
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await;
    (stream, head)
}

async fn send_frame(stream: &mut TcpStream, frame: Frame) {
    let bytes = encode_frame(&frame.with_mask([0xA, 0xB, 0xC, 0xD])).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

async fn recv_frame(stream: &mut TcpStream) -> Frame {
    let options = ReadOptions {
        compression: true,
        ..ReadOptions::default()
    };
    read_frame(stream, options).await.unwrap()
}

#[tokio::test]
async fn serves_plain_http() {
    let server = start(false).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let response = send_request(&mut stream, "/").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.ends_with("Hello from hyper over http!"));
}

#[tokio::test]
async fn websocket_echo_and_close() {
    let server = start(false).await;
    let (mut stream, head) = upgrade(server.addr, "").await;
    assert!(head.starts_with("HTTP/1.1 101"), "{}", head);
    let accept = format!("sec-websocket-accept: {}", ACCEPT).to_ascii_lowercase();
    assert!(head.to_ascii_lowercase().contains(&accept), "{}", head);

    send_frame(&mut stream, Frame::new(false, Opcode::Text, b"ab".to_vec())).await;
    send_frame(&mut stream, Frame::new(false, Opcode::Continuation, b"cd".to_vec())).await;
    send_frame(&mut stream, Frame::new(true, Opcode::Continuation, b"ef".to_vec())).await;
    let echo = recv_frame(&mut stream).await;
    assert_eq!(echo.opcode, Opcode::Text);
    assert_eq!(echo.payload, b"abcdef");
    assert!(!echo.is_masked());

    send_frame(&mut stream, Frame::binary(vec![1, 2, 3])).await;
    assert_eq!(recv_frame(&mut stream).await.payload, vec![1, 2, 3]);

    send_frame(&mut stream, Frame::close(1000, b"bye")).await;
    let close = recv_frame(&mut stream).await;
    assert_eq!(close.opcode, Opcode::Close);
    assert_eq!(close.payload, [&[0x03, 0xE8][..], b"bye"].concat());
}

#[tokio::test]
async fn websocket_with_permessage_deflate() {
    let server = start(false).await;
    let (mut stream, head) = upgrade(
        server.addr,
        "Sec-WebSocket-Extensions: permessage-deflate; client_max_window_bits\r\n",
    )
    .await;
    assert!(head
        .to_ascii_lowercase()
        .contains("sec-websocket-extensions: permessage-deflate"));

    let mut client = Deflate::new(7);
    for message in ["one", "two two", "one"] {
        let compressed = client.compress(message.as_bytes()).unwrap();
        send_frame(&mut stream, Frame::text(compressed).compressed()).await;
        let echo = recv_frame(&mut stream).await;
        assert!(echo.is_compressed());
        assert_eq!(client.decompress(&echo.payload, 1 << 20).unwrap(), message.as_bytes());
    }
}

#[tokio::test]
async fn missing_version_is_426() {
    let server = start(false).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\r\n",
        KEY
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 426"), "{}", head);
    assert!(head.to_ascii_lowercase().contains("sec-websocket-version: 13, 8, 7"));
}

#[tokio::test]
async fn tls_and_plain_share_the_port() {
    let server = start(true).await;

    let mut plain = TcpStream::connect(server.addr).await.unwrap();
    let response = send_request(&mut plain, "/secure").await;
    assert!(response.ends_with("secure=Some(false)"), "{}", response);

    let mut roots = RootCertStore::empty();
    let ca = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/ca.pem");
    for cert in load_certs(&ca).unwrap() {
        roots.add(cert).unwrap();
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let tcp = TcpStream::connect(server.addr).await.unwrap();
    let domain = ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(domain, tcp).await.unwrap();
    let response = send_request(&mut tls, "/secure").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.ends_with("secure=Some(true)"), "{}", response);
}

#[tokio::test]
async fn client_hello_without_certificate_only_drops_that_connection() {
    let server = start(false).await;

    let mut hello = TcpStream::connect(server.addr).await.unwrap();
    hello.write_all(&[0x16, 0x03, 0x01, 0x00, 0x05]).await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), hello.read_to_end(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));

    let mut plain = TcpStream::connect(server.addr).await.unwrap();
    let response = send_request(&mut plain, "/").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
}
