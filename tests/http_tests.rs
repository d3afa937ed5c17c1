//! End-to-end tests of the live client against a local HTTP/1.1 server.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use petchat::{
    ChatClient, ChatConfig, ChatMessage, ChatSession, SendOutcome, SessionContext,
};

/// One request as the server saw it.
struct Captured {
    head: String,
    body: Vec<u8>,
}

/// What the server writes back.
enum Reply {
    Whole(Vec<u8>),
    /// A chunked `text/plain` body written `gap` apart; `complete: false` drops the connection
    /// mid-body.
    Chunked {
        chunks: Vec<Vec<u8>>,
        gap: Duration,
        complete: bool,
    },
    Silent,
}

async fn serve_once(reply: Reply) -> (ChatConfig, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        match reply {
            Reply::Whole(bytes) => {
                socket.write_all(&bytes).await.unwrap();
            }
            Reply::Chunked {
                chunks,
                gap,
                complete,
            } => {
                socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\n\
                          Transfer-Encoding: chunked\r\n\r\n",
                    )
                    .await
                    .unwrap();
                for chunk in chunks {
                    socket
                        .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                        .await
                        .unwrap();
                    socket.write_all(&chunk).await.unwrap();
                    socket.write_all(b"\r\n").await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(gap).await;
                }
                if complete {
                    socket.write_all(b"0\r\n\r\n").await.unwrap();
                }
            }
            Reply::Silent => {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
        let _ = socket.shutdown().await;
        captured
    });
    let config = ChatConfig::new().with_base_url(format!("http://{addr}"));
    (config, handle)
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buffer = Vec::new();
    let mut scratch = [0u8; 1024];
    let head_end = loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        let n = socket.read(&mut scratch).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buffer.extend_from_slice(&scratch[..n]);
    };
    let head = String::from_utf8(buffer[..head_end].to_vec()).unwrap();
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    while buffer.len() < head_end + length {
        let n = socket.read(&mut scratch).await.unwrap();
        assert!(n > 0, "client closed before sending the body");
        buffer.extend_from_slice(&scratch[..n]);
    }
    Captured {
        head,
        body: buffer[head_end..head_end + length].to_vec(),
    }
}

fn whole(status: &str, content_type: &str, body: &str) -> Reply {
    Reply::Whole(
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        )
        .into_bytes(),
    )
}

fn session(config: ChatConfig) -> ChatSession {
    let client = ChatClient::new(&config).unwrap();
    ChatSession::new(client, config).with_context(SessionContext::new("u1").with_animal("bori"))
}

#[tokio::test]
async fn posts_json_and_reads_json_reply() {
    let (config, server) = serve_once(whole(
        "200 OK",
        "application/json",
        r#"{"content":"물을 충분히 주세요"}"#,
    ))
    .await;
    let session = session(config.with_cookie(Some("sid=abc".to_string())));

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Replied { .. }));
    assert_eq!(
        session.transcript().to_vec(),
        vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("물을 충분히 주세요")
        ]
    );

    let captured = server.await.unwrap();
    let head = captured.head.to_ascii_lowercase();
    assert!(head.starts_with("post /api/chat http/1.1\r\n"), "{head}");
    assert!(head.contains("content-type: application/json"), "{head}");
    assert!(head.contains("cookie: sid=abc"), "{head}");
    let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "user_id": "u1",
            "animal_id": "bori",
            "messages": [{ "role": "user", "content": "hi" }],
            "temperature": 0.7,
            "model": "gpt-4.1",
        })
    );
}

#[tokio::test]
async fn chunked_text_is_streamed_into_one_entry() {
    let text = "하루 두 번 산책하세요";
    let bytes = text.as_bytes().to_vec();
    let (config, server) = serve_once(Reply::Chunked {
        chunks: vec![bytes[..4].to_vec(), bytes[4..11].to_vec(), bytes[11..].to_vec()],
        gap: Duration::from_millis(20),
        complete: true,
    })
    .await;
    let session = session(config);

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Streamed { .. }), "{outcome:?}");
    assert_eq!(
        session.transcript().to_vec(),
        vec![ChatMessage::user("hi"), ChatMessage::assistant(text)]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn server_error_becomes_error_message() {
    let (config, server) =
        serve_once(whole("500 Internal Server Error", "text/plain", "server error")).await;
    let session = session(config);

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    assert_eq!(
        session.transcript().to_vec(),
        vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("에러: server error")
        ]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn dropped_connection_keeps_partial_text() {
    let (config, server) = serve_once(Reply::Chunked {
        chunks: vec![b"partial".to_vec()],
        gap: Duration::from_millis(20),
        complete: false,
    })
    .await;
    let session = session(config);

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Failed { .. }), "{outcome:?}");
    let messages = session.transcript().to_vec();
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert_eq!(messages[1], ChatMessage::assistant("partial"));
    assert!(messages[2].content.starts_with("에러: Streaming error"), "{messages:?}");
    assert!(!session.is_busy());
    server.await.unwrap();
}

#[tokio::test]
async fn slow_server_times_out() {
    let (config, server) = serve_once(Reply::Silent).await;
    let session = session(config.with_timeout(Duration::from_millis(200)));

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    let last = session.transcript().last().cloned().unwrap();
    assert!(last.content.starts_with("에러: Timeout error"), "{}", last.content);
    server.abort();
}

#[tokio::test]
async fn stream_may_outlive_the_timeout() {
    let (config, server) = serve_once(Reply::Chunked {
        chunks: vec![b"a".to_vec(); 6],
        gap: Duration::from_millis(150),
        complete: true,
    })
    .await;
    let session = session(config.with_timeout(Duration::from_millis(300)));

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Streamed { .. }), "{outcome:?}");
    assert_eq!(
        session.transcript().to_vec(),
        vec![ChatMessage::user("hi"), ChatMessage::assistant("aaaaaa")]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_endpoint_is_retried_then_reported() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ChatConfig::new()
        .with_base_url(format!("http://{addr}"))
        .with_retries(2, Duration::from_millis(10), Duration::from_millis(20));
    let client = Arc::new(ChatClient::new(&config).unwrap());
    let session = ChatSession::with_transport(client, config).with_context(SessionContext::new("u1"));

    let outcome = session.send("hi").await.unwrap();

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    let last = session.transcript().last().cloned().unwrap();
    assert!(last.content.starts_with("에러: Connection error"), "{}", last.content);
}
