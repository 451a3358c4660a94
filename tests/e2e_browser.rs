//! Full Witness() runs against a real Chromium and a tiny local HTTP
//! server. These need an actual browser binary on PATH (or
//! `CHROME_PATH` set) and are skipped by default; run with
//! `cargo test -- --ignored` on a machine that has one.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use webwitness::browser::ChromiumDriver;
use webwitness::config::Options;
use webwitness::driver::Driver;
use webwitness::fingerprint::BuiltinFingerprintEngine;

/// A minimal single-shot HTTP server: `/ok` returns 200 with a titled
/// page, `/a` redirects to `/b`, `/b` returns 200.
async fn serve(listener: TcpListener) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let n = match socket.read(&mut buf).await {
                Ok(n) if n > 0 => n,
                _ => return,
            };
            let request = String::from_utf8_lossy(&buf[..n]);
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/");

            let response = match path {
                "/ok" => {
                    let body = "<html><head><title>Hi</title></head><body>x</body></html>";
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    )
                }
                "/a" => "HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n".to_string(),
                "/b" => {
                    let body = "<html><body>redirected</body></html>";
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    )
                }
                _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string(),
            };

            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
    }
}

fn test_options(screenshot_dir: std::path::PathBuf) -> Options {
    let mut options = Options::default();
    options.scan.screenshot_path = screenshot_dir;
    options.scan.timeout_seconds = 15;
    options
}

#[tokio::test]
#[ignore = "requires a real Chromium/Chrome binary on this machine"]
async fn happy_path_200_with_title_and_screenshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener));

    let dir = std::env::temp_dir().join(format!("webwitness-e2e-{}", uuid::Uuid::new_v4()));
    let options = Arc::new(test_options(dir.clone()).finalize().await.unwrap());
    let driver = ChromiumDriver::new(options, Arc::new(BuiltinFingerprintEngine::new()));

    let target = format!("http://{addr}/ok");
    let result = driver.witness(target.clone()).await.unwrap();

    assert_eq!(result.url, target);
    assert_eq!(result.response_code, 200);
    assert_eq!(result.title.as_deref(), Some("Hi"));
    assert_eq!(result.final_url.as_deref(), Some(target.as_str()));
    assert!(!result.network.is_empty());
    assert!(!result.failed);
    assert!(result.filename.as_deref().unwrap_or("").ends_with(".jpeg"));
    assert!(result.perception_hash.is_some());

    driver.close().await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
#[ignore = "requires a real Chromium/Chrome binary on this machine"]
async fn redirect_chain_anchors_on_the_first_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener));

    let dir = std::env::temp_dir().join(format!("webwitness-e2e-{}", uuid::Uuid::new_v4()));
    let options = Arc::new(test_options(dir.clone()).finalize().await.unwrap());
    let driver = ChromiumDriver::new(options, Arc::new(BuiltinFingerprintEngine::new()));

    let requested = format!("http://{addr}/a");
    let result = driver.witness(requested.clone()).await.unwrap();

    assert_eq!(result.url, requested);
    assert_eq!(result.response_code, 200);
    assert_eq!(result.final_url.as_deref(), Some(format!("http://{addr}/b").as_str()));
    // One entry for the 302 hop (via requestWillBeSent's redirect_response),
    // one for the final 200 (via responseReceived).
    assert_eq!(result.network.len(), 2);
    assert_eq!(result.network[0].status_code, 302);
    assert_eq!(result.network[1].status_code, 200);

    driver.close().await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
#[ignore = "requires a real Chromium/Chrome binary on this machine"]
async fn dns_failure_yields_zero_response_code_and_failed_result() {
    let dir = std::env::temp_dir().join(format!("webwitness-e2e-{}", uuid::Uuid::new_v4()));
    let options = Arc::new(test_options(dir.clone()).finalize().await.unwrap());
    let driver = ChromiumDriver::new(options, Arc::new(BuiltinFingerprintEngine::new()));

    let result = driver
        .witness("http://no-such-host.invalid./".to_string())
        .await
        .unwrap();

    assert_eq!(result.response_code, 0);
    assert!(result.failed);
    assert!(result.failed_reason.is_some());

    driver.close().await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}
