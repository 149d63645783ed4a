use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[test]
fn rest_url_maps_realtime_schemes() {
    assert_eq!(
        rest_url("wss://svc.example.test", ADDRESS_BOOK_PATH)
            .unwrap()
            .as_str(),
        "https://svc.example.test/addressbook"
    );
    assert_eq!(
        rest_url("ws://127.0.0.1:9000/api/?x=1", ADDRESS_BOOK_PATH)
            .unwrap()
            .as_str(),
        "http://127.0.0.1:9000/api/addressbook"
    );
    assert!(matches!(
        rest_url("mailto:someone@example.test", ADDRESS_BOOK_PATH),
        Err(ClientError::InvalidUrl(_))
    ));
}

/// Serves one HTTP response and hands back the raw request it received.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let port = portpicker::pick_unused_port().expect("No free ports");
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await.expect("Can't bind");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
    });

    (format!("ws://{addr}"), rx)
}

#[tokio::test]
async fn fetch_address_book_uses_basic_auth() {
    let (base, seen) = serve_once("HTTP/1.1 200 OK", r#"{"members":[{"name":"org1"}]}"#).await;
    let endpoint = Endpoint::new(base, true);
    let credential = Credential::new("user", "pass");

    let book = fetch_address_book(&endpoint, &credential).await.unwrap();
    assert_eq!(book["members"][0]["name"], "org1");

    let request = seen.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /addressbook "), "{request}");
    assert!(request.contains("authorization: basic dxnlcjpwyxnz"), "{request}");
}

#[tokio::test]
async fn fetch_address_book_reports_http_errors() {
    let (base, _seen) = serve_once("HTTP/1.1 401 Unauthorized", "{}").await;
    let endpoint = Endpoint::new(base, true);

    assert!(matches!(
        fetch_address_book(&endpoint, &Credential::new("user", "bad")).await,
        Err(ClientError::Http(_))
    ));
}
