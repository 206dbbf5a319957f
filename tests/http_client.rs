use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};
use webcall_login::{FetchError, FetchRequest, ReqwestExecutor, RequestExecutor};

/// What the mock server saw of one request.
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

// Integration tests for ReqwestExecutor
async fn start_mock_server(
    status: u16,
    response_body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<Captured>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();

            tokio::spawn(async move {
                let mut reader = BufReader::new(&mut stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.is_err() {
                    return;
                }

                // Read HTTP headers
                let mut headers = Vec::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.is_err() {
                        return;
                    }
                    if line.trim().is_empty() {
                        break;
                    }
                    headers.push(line.trim_end().to_string());
                }

                let length = headers
                    .iter()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                let mut body = vec![0; length];
                if reader.read_exact(&mut body).await.is_err() {
                    return;
                }

                let _ = tx.send(Captured {
                    request_line: request_line.trim_end().to_string(),
                    headers,
                    body: String::from_utf8_lossy(&body).to_string(),
                });

                let http_response = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                let _ = stream.write_all(http_response.as_bytes()).await;
            });
        }
    });

    (addr, rx, handle)
}

/// Accepts connections and never answers.
async fn start_silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind silent server");
    let addr = listener.local_addr().expect("silent server address");

    let handle = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            open.push(stream);
        }
    });

    (addr, handle)
}

fn executor(timeout: Duration) -> ReqwestExecutor {
    ReqwestExecutor::new(timeout, false).expect("failed to create executor")
}

#[tokio::test]
async fn delivered_response_returns_body() {
    let (addr, mut rx, server_handle) = start_mock_server(200, "notavail 4711").await;

    let response = executor(Duration::from_secs(5))
        .fetch(FetchRequest::get(format!("http://{addr}/rtcsig/online?id=4711")))
        .await
        .expect("request failed");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "notavail 4711");

    let captured = rx.recv().await.expect("no request captured");
    assert!(
        captured
            .request_line
            .starts_with("GET /rtcsig/online?id=4711&_="),
        "unexpected request line: {}",
        captured.request_line
    );
    assert_eq!(
        captured.header("content-type"),
        Some("text/plain; charset=utf-8")
    );

    server_handle.abort();
}

#[tokio::test]
async fn cache_buster_starts_query() {
    let (addr, mut rx, server_handle) = start_mock_server(200, "").await;

    let response = executor(Duration::from_secs(5))
        .fetch(FetchRequest::get(format!("http://{addr}/rtcsig/online")))
        .await
        .expect("request failed");
    assert_eq!(response.body, "");

    let captured = rx.recv().await.expect("no request captured");
    let target = captured
        .request_line
        .split_whitespace()
        .nth(1)
        .expect("request target");
    let millis = target
        .strip_prefix("/rtcsig/online?_=")
        .expect("cache buster missing");
    assert!(millis.parse::<i64>().expect("numeric cache buster") > 0);

    server_handle.abort();
}

#[tokio::test]
async fn post_sends_body() {
    let (addr, mut rx, server_handle) = start_mock_server(200, "ok").await;

    executor(Duration::from_secs(5))
        .fetch(FetchRequest::post(format!("http://{addr}/rtcsig/data"), "hello"))
        .await
        .expect("request failed");

    let captured = rx.recv().await.expect("no request captured");
    assert!(captured.request_line.starts_with("POST /rtcsig/data?_="));
    assert_eq!(captured.body, "hello");

    server_handle.abort();
}

#[tokio::test]
async fn error_status_is_not_delivered() {
    let (addr, _rx, server_handle) = start_mock_server(404, "not found").await;

    let err = executor(Duration::from_secs(5))
        .fetch(FetchRequest::get(format!("http://{addr}/rtcsig/online")))
        .await
        .expect_err("404 must fail");

    assert_eq!(err, FetchError::Status { status: 404 });
    assert_eq!(err.reason(), "fetch error");
    assert_eq!(err.status(), 404);

    server_handle.abort();
}

#[tokio::test]
async fn unresponsive_server_times_out() {
    let (addr, server_handle) = start_silent_server().await;

    let err = executor(Duration::from_millis(300))
        .fetch(FetchRequest::get(format!("http://{addr}/rtcsig/online")))
        .await
        .expect_err("silent server must time out");

    assert_eq!(err, FetchError::Timeout);
    assert_eq!(err.reason(), "timeout");

    server_handle.abort();
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    // bind and drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        listener.local_addr().expect("address")
    };

    let err = executor(Duration::from_secs(5))
        .fetch(FetchRequest::get(format!("http://{addr}/rtcsig/online")))
        .await
        .expect_err("closed port must fail");

    assert!(matches!(err, FetchError::Transport { status: 0, .. }));
    assert_eq!(err.reason(), "fetching");
}
