//! Client connection tests against an in-process echo server.
//!
//! The server side is assembled from the crate's own building blocks in
//! server role: it answers the upgrade with the computed accept key,
//! reads masked frames, reassembles fragmented messages and echoes data
//! messages back.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

use chrome_pdf::websocket::{
    ConnectOptions, DeflateConfig, DeflateContext, Frame, FrameCodec, Message, Opcode, Role,
    WsConnection, accept_key,
};

// ============================================================================
// Echo server
// ============================================================================

/// Accepts one connection, upgrades it and echoes data messages until
/// the client closes.
async fn serve_echo(listener: TcpListener, compression: Option<DeflateConfig>) {
    let (mut stream, _) = listener.accept().await.expect("accept");
    let offered = upgrade(&mut stream, compression.is_some()).await;
    let mut context = match (compression, offered) {
        (Some(config), true) => Some(DeflateContext::new(config, Role::Server)),
        _ => None,
    };

    let codec = FrameCodec::server();
    let mut message: Vec<u8> = Vec::new();
    let mut opcode = Opcode::Text;
    let mut compressed = false;

    loop {
        let frame = codec.read_frame(&mut stream).await.expect("read frame");
        match frame.opcode {
            Opcode::Close => {
                let echo = codec.encode(&Frame::new(Opcode::Close, frame.payload));
                stream.write_all(&echo).await.expect("echo close");
                return;
            }
            Opcode::Ping => {
                let pong = codec.encode(&Frame::pong(frame.payload));
                stream.write_all(&pong).await.expect("pong");
                continue;
            }
            Opcode::Pong => continue,
            Opcode::Text | Opcode::Binary => {
                opcode = frame.opcode;
                compressed = frame.rsv1;
                message = frame.payload;
            }
            Opcode::Continuation => message.extend_from_slice(&frame.payload),
        }
        if !frame.fin {
            continue;
        }

        let mut payload = std::mem::take(&mut message);
        let mut rsv1 = false;
        if compressed {
            let context = context.as_mut().expect("negotiated context");
            payload = context.decompress(&payload).expect("decompress");
            payload = context.compress(&payload).expect("compress");
            rsv1 = true;
        }
        let mut echo = Frame::new(opcode, payload);
        echo.rsv1 = rsv1;
        stream.write_all(&codec.encode(&echo)).await.expect("echo");
    }
}

/// Reads the upgrade request and answers with 101. Returns whether the
/// client offered permessage-deflate.
async fn upgrade(stream: &mut TcpStream, accept_compression: bool) -> bool {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.expect("request head");
        head.push(byte[0]);
    }
    let text = String::from_utf8(head).expect("utf-8 request");
    let key = text
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .expect("key header");
    let offered = text.contains("Sec-WebSocket-Extensions: permessage-deflate");

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n",
        accept_key(key)
    );
    if offered && accept_compression {
        response.push_str("Sec-WebSocket-Extensions: permessage-deflate\r\n");
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await.expect("response");
    offered
}

async fn start_server(compression: Option<DeflateConfig>) -> (Url, JoinHandle<()>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = tokio::spawn(serve_echo(listener, compression));
    let uri = Url::parse(&format!("ws://127.0.0.1:{port}/echo")).expect("uri");
    (uri, handle)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn connect_and_echo_text() {
    let (uri, server) = start_server(None).await;
    let mut connection = WsConnection::connect(&uri).await.expect("connect");

    connection
        .send(Message::text(r#"{"id":1,"method":"Page.enable"}"#))
        .await
        .expect("send");
    let echoed = connection.receive().await.expect("receive");
    assert_eq!(echoed, Message::text(r#"{"id":1,"method":"Page.enable"}"#));

    connection.close().await.expect("close");
    server.await.expect("server");
}

#[tokio::test]
async fn fragmented_message_is_reassembled() {
    let (uri, server) = start_server(None).await;
    let options = ConnectOptions::default().frame_size(64);
    let mut connection = WsConnection::connect_with(&uri, options).await.expect("connect");

    // Far larger than the frame size, so the client must fragment and
    // the server must reassemble before echoing.
    let body = "x".repeat(1000);
    connection.send(Message::text(&body)).await.expect("send");
    match connection.receive().await.expect("receive") {
        Message::Text(text) => assert_eq!(text, body),
        other => panic!("unexpected message: {other:?}"),
    }

    connection.close().await.expect("close");
    server.await.expect("server");
}

#[tokio::test]
async fn compressed_echo_roundtrip() {
    let config = DeflateConfig::default();
    let (uri, server) = start_server(Some(config.clone())).await;
    let options = ConnectOptions::default().compression(config);
    let mut connection = WsConnection::connect_with(&uri, options).await.expect("connect");

    let body = r#"{"method":"Network.requestWillBeSent","params":{}}"#.repeat(20);
    connection.send(Message::text(&body)).await.expect("send");
    match connection.receive().await.expect("receive") {
        Message::Text(text) => assert_eq!(text, body),
        other => panic!("unexpected message: {other:?}"),
    }

    connection.close().await.expect("close");
    server.await.expect("server");
}

#[tokio::test]
async fn close_is_acknowledged_and_final() {
    let (uri, server) = start_server(None).await;
    let mut connection = WsConnection::connect(&uri).await.expect("connect");

    connection.close().await.expect("close");
    let err = connection
        .send(Message::text("too late"))
        .await
        .expect_err("closed connection must reject sends");
    assert!(matches!(err, chrome_pdf::Error::ConnectionClosed));

    server.await.expect("server");
}

#[tokio::test]
async fn binary_echo() {
    let (uri, server) = start_server(None).await;
    let mut connection = WsConnection::connect(&uri).await.expect("connect");

    let payload: Vec<u8> = (0..=255u8).collect();
    connection
        .send(Message::Binary(payload.clone()))
        .await
        .expect("send");
    assert_eq!(
        connection.receive().await.expect("receive"),
        Message::Binary(payload)
    );

    connection.close().await.expect("close");
    server.await.expect("server");
}
